use std::time::Duration;

use async_trait::async_trait;
use core_config::FromEnv;
use futures::future::try_join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::MilvusConfig;
use crate::backend::{InsertRequest, RawSearchResults, Reply, Status, StatusCode, VectorBackend};
use crate::error::{VectorError, VectorResult};
use crate::models::{CollectionSpec, FieldColumn, FieldData, FieldKind, FieldSpec, RecordId};
use crate::query::SearchQuery;

/// Milvus-backed implementation of VectorBackend over the REST v2 API
pub struct MilvusBackend {
    client: Client,
    config: MilvusConfig,
}

/// `{code, message, data}` reply wrapper used by every v2 endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn status(&self) -> Status {
        if self.code == 0 || self.code == 200 {
            return Status::success();
        }
        Status::error(classify(self.code, &self.message), self.message.clone())
    }

    fn into_reply<T>(self, parse: impl FnOnce(Value) -> VectorResult<T>) -> VectorResult<Reply<T>> {
        let status = self.status();
        if !status.is_success() {
            return Ok(Reply::failed(status));
        }
        Ok(Reply::ok(parse(self.data)?))
    }
}

/// Milvus reports most failures under generic codes; the message carries the kind
fn classify(code: i32, message: &str) -> StatusCode {
    let message = message.to_ascii_lowercase();
    if message.contains("already exist") {
        StatusCode::CollectionAlreadyExists
    } else if message.contains("not loaded") {
        StatusCode::CollectionNotLoaded
    } else if message.contains("partition not found") || message.contains("partition not exist") {
        StatusCode::PartitionNotFound
    } else if message.contains("not found")
        || message.contains("can't find")
        || message.contains("not exist")
    {
        StatusCode::CollectionNotFound
    } else if code == 1100 {
        StatusCode::IllegalArgument
    } else {
        StatusCode::Unexpected(code)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeData {
    collection_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    shards_num: Option<u32>,
    #[serde(default)]
    auto_id: bool,
    #[serde(default)]
    fields: Vec<DescribeField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeField {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    auto_id: bool,
    #[serde(default)]
    params: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    value: Value,
}

impl DescribeField {
    fn param_u32(&self, key: &str) -> Option<u32> {
        let value = &self.params.iter().find(|p| p.key == key)?.value;
        match value {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64().and_then(|n| u32::try_from(n).ok()),
        }
    }

    fn kind(&self) -> VectorResult<FieldKind> {
        let kind = match self.data_type.as_str() {
            "Bool" => FieldKind::Bool,
            "Int8" | "Int16" | "Int32" => FieldKind::Int32,
            "Int64" => FieldKind::Int64,
            "Float" => FieldKind::Float,
            "Double" => FieldKind::Double,
            "VarChar" => FieldKind::VarChar {
                max_length: self.param_u32("max_length").unwrap_or(65_535),
            },
            "FloatVector" => FieldKind::FloatVector {
                dim: self.param_u32("dim").ok_or_else(|| {
                    VectorError::decode(format!("vector field {} has no dim", self.name))
                })?,
            },
            other => {
                return Err(VectorError::decode(format!(
                    "field {} has unsupported type {}",
                    self.name, other
                )));
            }
        };
        Ok(kind)
    }
}

impl DescribeData {
    fn into_spec(self) -> VectorResult<CollectionSpec> {
        let collection_auto_id = self.auto_id;
        let fields = self
            .fields
            .iter()
            .map(|f| {
                Ok(FieldSpec {
                    name: f.name.clone(),
                    kind: f.kind()?,
                    is_primary: f.primary_key,
                    auto_id: f.primary_key && (f.auto_id || collection_auto_id),
                })
            })
            .collect::<VectorResult<Vec<_>>>()?;

        Ok(CollectionSpec {
            name: self.collection_name,
            description: self.description,
            shards_num: self.shards_num.unwrap_or(1),
            fields,
        })
    }
}

fn wire_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool => "Bool",
        FieldKind::Int32 => "Int32",
        FieldKind::Int64 => "Int64",
        FieldKind::Float => "Float",
        FieldKind::Double => "Double",
        FieldKind::VarChar { .. } => "VarChar",
        FieldKind::FloatVector { .. } => "FloatVector",
    }
}

fn record_id(value: &Value) -> VectorResult<RecordId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| VectorError::decode(format!("invalid record id: {}", value)))
}

fn rows_from_columns(fields: &[FieldColumn]) -> Vec<Value> {
    let row_count = fields.first().map_or(0, |c| c.data.len());
    (0..row_count)
        .map(|row| {
            let object: Map<String, Value> = fields
                .iter()
                .filter_map(|column| column.data.json_at(row).map(|v| (column.name.clone(), v)))
                .collect();
            Value::Object(object)
        })
        .collect()
}

impl MilvusBackend {
    pub fn new(config: MilvusConfig) -> VectorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> VectorResult<Self> {
        Self::new(MilvusConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn call(&self, path: &str, mut body: Value) -> VectorResult<Envelope> {
        if let (Some(db_name), Value::Object(map)) = (&self.config.db_name, &mut body) {
            map.insert("dbName".to_string(), Value::String(db_name.clone()));
        }

        let mut request = self.client.post(self.endpoint(path)).json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VectorError::BackendUnavailable(format!("{}: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(VectorError::BackendUnavailable(format!(
                "{} returned HTTP {}: {}",
                path, status, text
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| VectorError::decode(format!("{} reply: {}", path, e)))?;

        if envelope.code != 0 && envelope.code != 200 {
            tracing::debug!(
                path,
                code = envelope.code,
                message = %envelope.message,
                "Milvus reported an error"
            );
        }
        Ok(envelope)
    }

    fn create_body(&self, spec: &CollectionSpec) -> Value {
        let auto_id = spec.primary_field().is_some_and(|f| f.auto_id);

        let fields: Vec<Value> = spec
            .fields
            .iter()
            .map(|field| {
                let mut entry = json!({
                    "fieldName": field.name,
                    "dataType": wire_type(&field.kind),
                    "isPrimary": field.is_primary,
                });
                let params = match field.kind {
                    FieldKind::VarChar { max_length } => {
                        Some(json!({"max_length": max_length.to_string()}))
                    }
                    FieldKind::FloatVector { dim } => Some(json!({"dim": dim.to_string()})),
                    _ => None,
                };
                if let (Some(params), Value::Object(map)) = (params, &mut entry) {
                    map.insert("elementTypeParams".to_string(), params);
                }
                entry
            })
            .collect();

        let index_params: Vec<Value> = spec
            .vector_fields()
            .map(|field| {
                json!({
                    "fieldName": field.name,
                    "indexName": format!("{}_idx", field.name),
                    "metricType": self.config.index_metric.as_str(),
                    "indexType": self.config.index_type,
                    "params": {"nlist": self.config.nlist},
                })
            })
            .collect();

        json!({
            "collectionName": spec.name,
            "description": spec.description,
            "schema": {
                "autoId": auto_id,
                "enableDynamicField": false,
                "fields": fields,
            },
            "indexParams": index_params,
            "params": {"shardsNum": spec.shards_num},
        })
    }

    fn search_body(&self, query: &SearchQuery, vector: &[f32]) -> Value {
        let mut body = json!({
            "collectionName": query.collection_name(),
            "data": [vector],
            "annsField": query.vector_field(),
            "limit": query.top_k(),
            "outputFields": query.output_fields(),
            "searchParams": {
                "metricType": query.metric().as_str(),
                "params": {"nprobe": query.nprobe()},
            },
        });

        if let Value::Object(map) = &mut body {
            if let Some(filter) = query.filter() {
                map.insert("filter".to_string(), Value::String(filter.to_string()));
            }
            if !query.partition_names().is_empty() {
                map.insert("partitionNames".to_string(), json!(query.partition_names()));
            }
            if let Some(level) = query.consistency() {
                map.insert(
                    "consistencyLevel".to_string(),
                    Value::String(level.as_str().to_string()),
                );
            }
        }
        body
    }

    /// The REST API flattens multi-vector results without per-query bounds,
    /// so each query vector is sent as its own request.
    async fn search_one(
        &self,
        query: &SearchQuery,
        vector: &[f32],
    ) -> VectorResult<Reply<Vec<Map<String, Value>>>> {
        self.call("entities/search", self.search_body(query, vector))
            .await?
            .into_reply(|data| match data {
                Value::Array(rows) => rows
                    .into_iter()
                    .map(|row| match row {
                        Value::Object(map) => Ok(map),
                        other => Err(VectorError::decode(format!(
                            "search row is not an object: {}",
                            other
                        ))),
                    })
                    .collect(),
                Value::Null => Ok(Vec::new()),
                other => Err(VectorError::decode(format!(
                    "search data is not an array: {}",
                    other
                ))),
            })
    }

    async fn primary_key_name(&self, collection_name: &str) -> VectorResult<String> {
        let spec = self
            .describe_collection(collection_name)
            .await?
            .into_data("describe_collection")?;
        spec.primary_field()
            .map(|f| f.name.clone())
            .ok_or_else(|| {
                VectorError::decode(format!("collection {} has no primary key", collection_name))
            })
    }

    async fn collect_results(
        &self,
        query: &SearchQuery,
        per_query: Vec<Vec<Map<String, Value>>>,
    ) -> VectorResult<RawSearchResults> {
        let rows: Vec<&Map<String, Value>> = per_query.iter().flatten().collect();

        let pk_name = match rows.first() {
            Some(row) if !row.contains_key("id") => {
                self.primary_key_name(query.collection_name()).await?
            }
            _ => "id".to_string(),
        };

        let ids = rows
            .iter()
            .map(|row| record_id(row.get(&pk_name).unwrap_or(&Value::Null)))
            .collect::<VectorResult<Vec<_>>>()?;

        let scores = rows
            .iter()
            .map(|row| {
                row.get("distance")
                    .and_then(Value::as_f64)
                    .map(|d| d as f32)
                    .ok_or_else(|| VectorError::decode("search row has no distance"))
            })
            .collect::<VectorResult<Vec<_>>>()?;

        let fields_data = if rows.is_empty() {
            Vec::new()
        } else {
            query
                .output_fields()
                .iter()
                .map(|name| {
                    let values = rows
                        .iter()
                        .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                        .collect();
                    Ok(FieldColumn::new(name.clone(), FieldData::from_json_column(name, values)?))
                })
                .collect::<VectorResult<Vec<_>>>()?
        };

        Ok(RawSearchResults {
            num_queries: per_query.len(),
            topks: per_query.iter().map(Vec::len).collect(),
            ids,
            scores,
            fields_data,
        })
    }
}

#[async_trait]
impl VectorBackend for MilvusBackend {
    async fn create_collection(&self, spec: CollectionSpec) -> VectorResult<Status> {
        let envelope = self.call("collections/create", self.create_body(&spec)).await?;
        Ok(envelope.status())
    }

    async fn describe_collection(
        &self,
        collection_name: &str,
    ) -> VectorResult<Reply<CollectionSpec>> {
        self.call("collections/describe", json!({"collectionName": collection_name}))
            .await?
            .into_reply(|data| serde_json::from_value::<DescribeData>(data)?.into_spec())
    }

    async fn create_partition(
        &self,
        collection_name: &str,
        partition_name: &str,
    ) -> VectorResult<Status> {
        let body = json!({"collectionName": collection_name, "partitionName": partition_name});
        Ok(self.call("partitions/create", body).await?.status())
    }

    async fn load_collection(&self, collection_name: &str) -> VectorResult<Status> {
        let body = json!({"collectionName": collection_name});
        Ok(self.call("collections/load", body).await?.status())
    }

    async fn release_collection(&self, collection_name: &str) -> VectorResult<Status> {
        let body = json!({"collectionName": collection_name});
        Ok(self.call("collections/release", body).await?.status())
    }

    async fn insert(&self, request: InsertRequest) -> VectorResult<Reply<Vec<RecordId>>> {
        let mut body = json!({
            "collectionName": request.collection_name,
            "data": rows_from_columns(&request.fields),
        });
        if let (Some(partition), Value::Object(map)) = (&request.partition_name, &mut body) {
            map.insert("partitionName".to_string(), Value::String(partition.clone()));
        }

        self.call("entities/insert", body).await?.into_reply(|data| {
            data.get("insertIds")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().map(record_id).collect())
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    async fn delete(&self, collection_name: &str, expr: &str) -> VectorResult<Reply<u64>> {
        let body = json!({"collectionName": collection_name, "filter": expr});
        self.call("entities/delete", body)
            .await?
            .into_reply(|data| Ok(data.get("deleteCount").and_then(Value::as_u64).unwrap_or(0)))
    }

    async fn search(&self, query: SearchQuery) -> VectorResult<Reply<RawSearchResults>> {
        let replies = try_join_all(
            query
                .vectors()
                .iter()
                .map(|vector| self.search_one(&query, vector)),
        )
        .await?;

        let mut per_query = Vec::with_capacity(replies.len());
        for reply in replies {
            if !reply.status.is_success() {
                return Ok(Reply::failed(reply.status));
            }
            per_query.push(reply.data.unwrap_or_default());
        }

        Ok(Reply::ok(self.collect_results(&query, per_query).await?))
    }

    async fn show_partitions(&self, collection_name: &str) -> VectorResult<Reply<Vec<Vec<u8>>>> {
        self.call("partitions/list", json!({"collectionName": collection_name}))
            .await?
            .into_reply(|data| {
                let names: Vec<String> = serde_json::from_value(data)?;
                Ok(names.into_iter().map(String::into_bytes).collect())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_codes() {
        assert_eq!(
            classify(65535, "collection already exists"),
            StatusCode::CollectionAlreadyExists
        );
        assert_eq!(
            classify(100, "can't find collection: docs"),
            StatusCode::CollectionNotFound
        );
        assert_eq!(classify(101, "collection not loaded"), StatusCode::CollectionNotLoaded);
        assert_eq!(classify(1100, "invalid parameter"), StatusCode::IllegalArgument);
        assert_eq!(classify(1801, "boom"), StatusCode::Unexpected(1801));
    }

    #[test]
    fn test_describe_maps_fields() {
        let data = json!({
            "collectionName": "pdf_data",
            "shardsNum": 2,
            "autoId": true,
            "fields": [
                {"name": "id", "type": "Int64", "primaryKey": true},
                {"name": "content", "type": "VarChar", "params": [{"key": "max_length", "value": "4096"}]},
                {"name": "content_word_count", "type": "Int16"},
                {"name": "content_vector", "type": "FloatVector", "params": [{"key": "dim", "value": 768}]}
            ]
        });
        let spec = serde_json::from_value::<DescribeData>(data)
            .unwrap()
            .into_spec()
            .unwrap();

        assert_eq!(spec.shards_num, 2);
        assert!(spec.primary_field().unwrap().auto_id);
        assert_eq!(spec.field("content").unwrap().kind, FieldKind::VarChar { max_length: 4096 });
        assert_eq!(spec.field("content_word_count").unwrap().kind, FieldKind::Int32);
        assert_eq!(spec.field("content_vector").unwrap().kind.dimension(), Some(768));
    }

    #[test]
    fn test_rows_from_columns() {
        let rows = rows_from_columns(&[
            FieldColumn::new("content", FieldData::VarChar(vec!["a".into(), "b".into()])),
            FieldColumn::new("v", FieldData::FloatVector(vec![vec![1.0], vec![2.0]])),
        ]);
        assert_eq!(
            rows,
            vec![json!({"content": "a", "v": [1.0]}), json!({"content": "b", "v": [2.0]})]
        );
    }

    #[test]
    fn test_record_id_accepts_strings() {
        assert_eq!(record_id(&json!("42")).unwrap(), 42);
        assert_eq!(record_id(&json!(7)).unwrap(), 7);
        assert!(record_id(&json!("x")).is_err());
    }
}
