//! Exact, in-process implementation of [`VectorBackend`].
//!
//! Scores every stored row by brute force, evaluates filter expressions with
//! [`Expr`], and tracks partitions and load state the way the real engine
//! reports them. Call counters make it usable as a spy in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{InsertRequest, RawSearchResults, Reply, Status, StatusCode, VectorBackend};
use crate::error::VectorResult;
use crate::expr::Expr;
use crate::models::{
    CollectionSpec, DEFAULT_PARTITION, FieldColumn, FieldData, FieldKind, FieldValue, MetricType,
    RecordId,
};
use crate::query::SearchQuery;

#[derive(Debug, Clone)]
struct StoredRow {
    id: RecordId,
    partition: String,
    scalars: HashMap<String, FieldValue>,
    vectors: HashMap<String, Vec<f32>>,
}

#[derive(Debug)]
struct StoredCollection {
    spec: CollectionSpec,
    loaded: bool,
    partitions: Vec<String>,
    rows: Vec<StoredRow>,
    next_id: RecordId,
}

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicUsize,
    releases: AtomicUsize,
    searches: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorBackend {
    collections: Arc<RwLock<HashMap<String, StoredCollection>>>,
    counters: Arc<Counters>,
}

fn not_found(name: &str) -> Status {
    Status::error(
        StatusCode::CollectionNotFound,
        format!("can't find collection: {}", name),
    )
}

fn illegal(reason: impl Into<String>) -> Status {
    Status::error(StatusCode::IllegalArgument, reason)
}

fn score(metric: MetricType, query: &[f32], stored: &[f32]) -> f32 {
    let dot: f32 = query.iter().zip(stored).map(|(a, b)| a * b).sum();
    match metric {
        MetricType::IP => dot,
        MetricType::L2 => query
            .iter()
            .zip(stored)
            .map(|(a, b)| (a - b) * (a - b))
            .sum(),
        MetricType::Cosine => {
            let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
            let denom = norm(query) * norm(stored);
            if denom == 0.0 { 0.0 } else { dot / denom }
        }
    }
}

fn typed_column(name: &str, kind: &FieldKind, rows: &[&StoredRow]) -> FieldColumn {
    let scalar = |row: &StoredRow| row.scalars.get(name).cloned();
    let data = match kind {
        FieldKind::Bool => FieldData::Bool(
            rows.iter()
                .map(|r| matches!(scalar(r), Some(FieldValue::Bool(true))))
                .collect(),
        ),
        FieldKind::Int32 => FieldData::Int32(
            rows.iter()
                .map(|r| match scalar(r) {
                    Some(FieldValue::Int(i)) => i as i32,
                    _ => 0,
                })
                .collect(),
        ),
        FieldKind::Int64 => FieldData::Int64(
            rows.iter()
                .map(|r| match scalar(r) {
                    Some(FieldValue::Int(i)) => i,
                    _ => r.id,
                })
                .collect(),
        ),
        FieldKind::Float => FieldData::Float(
            rows.iter()
                .map(|r| match scalar(r) {
                    Some(FieldValue::Float(f)) => f as f32,
                    Some(FieldValue::Int(i)) => i as f32,
                    _ => 0.0,
                })
                .collect(),
        ),
        FieldKind::Double => FieldData::Double(
            rows.iter()
                .map(|r| match scalar(r) {
                    Some(FieldValue::Float(f)) => f,
                    Some(FieldValue::Int(i)) => i as f64,
                    _ => 0.0,
                })
                .collect(),
        ),
        FieldKind::VarChar { .. } => FieldData::VarChar(
            rows.iter()
                .map(|r| match scalar(r) {
                    Some(FieldValue::String(s)) => s,
                    _ => String::new(),
                })
                .collect(),
        ),
        FieldKind::FloatVector { .. } => FieldData::FloatVector(
            rows.iter()
                .map(|r| r.vectors.get(name).cloned().unwrap_or_default())
                .collect(),
        ),
    };
    FieldColumn::new(name, data)
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical loads performed so far
    pub fn load_count(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    /// Physical releases performed so far
    pub fn release_count(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.counters.searches.load(Ordering::SeqCst)
    }

    pub async fn is_loaded(&self, collection_name: &str) -> bool {
        self.collections
            .read()
            .await
            .get(collection_name)
            .is_some_and(|c| c.loaded)
    }

    pub async fn row_count(&self, collection_name: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection_name)
            .map_or(0, |c| c.rows.len())
    }

    fn build_rows(
        collection: &mut StoredCollection,
        partition: String,
        fields: &[FieldColumn],
    ) -> Result<Vec<StoredRow>, Status> {
        let row_count = fields.first().map_or(0, |c| c.data.len());
        if row_count == 0 || fields.iter().any(|c| c.data.len() != row_count) {
            return Err(illegal("field columns must have the same non-zero row count"));
        }

        let primary = collection
            .spec
            .primary_field()
            .cloned()
            .ok_or_else(|| illegal("collection has no primary key"))?;

        // ids are claimed only once every row has been built
        let first_auto_id = collection.next_id + 1;
        let mut rows = Vec::with_capacity(row_count);
        for row in 0..row_count {
            let mut scalars = HashMap::new();
            let mut vectors = HashMap::new();

            for column in fields {
                let Some(field) = collection.spec.field(&column.name) else {
                    return Err(illegal(format!("field {} does not exist", column.name)));
                };
                if !column.data.matches(&field.kind) {
                    return Err(illegal(format!("field {} has the wrong type", column.name)));
                }
                match &column.data {
                    FieldData::FloatVector(values) => {
                        let vector = values[row].clone();
                        if field.kind.dimension() != Some(vector.len() as u32) {
                            return Err(illegal(format!(
                                "field {} expects dimension {:?}, got {}",
                                column.name,
                                field.kind.dimension(),
                                vector.len()
                            )));
                        }
                        vectors.insert(column.name.clone(), vector);
                    }
                    data => {
                        if let Some(value) = data.scalar_at(row) {
                            scalars.insert(column.name.clone(), value);
                        }
                    }
                }
            }

            let id = if primary.auto_id {
                first_auto_id + row as RecordId
            } else {
                match scalars.get(&primary.name) {
                    Some(FieldValue::Int(id)) => *id,
                    _ => return Err(illegal(format!("primary key {} is required", primary.name))),
                }
            };
            scalars.insert(primary.name.clone(), FieldValue::Int(id));

            rows.push(StoredRow {
                id,
                partition: partition.clone(),
                scalars,
                vectors,
            });
        }
        if primary.auto_id {
            collection.next_id += row_count as RecordId;
        }
        Ok(rows)
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn create_collection(&self, spec: CollectionSpec) -> VectorResult<Status> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(&spec.name) {
            return Ok(Status::error(
                StatusCode::CollectionAlreadyExists,
                format!("collection {} already exists", spec.name),
            ));
        }
        if let Err(err) = spec.validate() {
            return Ok(illegal(err.to_string()));
        }

        collections.insert(
            spec.name.clone(),
            StoredCollection {
                spec,
                loaded: false,
                partitions: vec![DEFAULT_PARTITION.to_string()],
                rows: Vec::new(),
                next_id: 0,
            },
        );
        Ok(Status::success())
    }

    async fn describe_collection(
        &self,
        collection_name: &str,
    ) -> VectorResult<Reply<CollectionSpec>> {
        let collections = self.collections.read().await;
        Ok(match collections.get(collection_name) {
            Some(collection) => Reply::ok(collection.spec.clone()),
            None => Reply::failed(not_found(collection_name)),
        })
    }

    async fn create_partition(
        &self,
        collection_name: &str,
        partition_name: &str,
    ) -> VectorResult<Status> {
        let mut collections = self.collections.write().await;
        let Some(collection) = collections.get_mut(collection_name) else {
            return Ok(not_found(collection_name));
        };
        if collection.partitions.iter().any(|p| p == partition_name) {
            return Ok(illegal(format!("partition {} already exists", partition_name)));
        }
        collection.partitions.push(partition_name.to_string());
        Ok(Status::success())
    }

    async fn load_collection(&self, collection_name: &str) -> VectorResult<Status> {
        let mut collections = self.collections.write().await;
        let Some(collection) = collections.get_mut(collection_name) else {
            return Ok(not_found(collection_name));
        };
        collection.loaded = true;
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Status::success())
    }

    async fn release_collection(&self, collection_name: &str) -> VectorResult<Status> {
        let mut collections = self.collections.write().await;
        let Some(collection) = collections.get_mut(collection_name) else {
            return Ok(not_found(collection_name));
        };
        collection.loaded = false;
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(Status::success())
    }

    async fn insert(&self, request: InsertRequest) -> VectorResult<Reply<Vec<RecordId>>> {
        let mut collections = self.collections.write().await;
        let Some(collection) = collections.get_mut(&request.collection_name) else {
            return Ok(Reply::failed(not_found(&request.collection_name)));
        };

        let partition = request
            .partition_name
            .unwrap_or_else(|| DEFAULT_PARTITION.to_string());
        if !collection.partitions.contains(&partition) {
            return Ok(Reply::failed(Status::error(
                StatusCode::PartitionNotFound,
                format!("partition not found: {}", partition),
            )));
        }

        let rows = match Self::build_rows(collection, partition, &request.fields) {
            Ok(rows) => rows,
            Err(status) => return Ok(Reply::failed(status)),
        };
        let ids = rows.iter().map(|r| r.id).collect();
        collection.rows.extend(rows);
        Ok(Reply::ok(ids))
    }

    async fn delete(&self, collection_name: &str, expr: &str) -> VectorResult<Reply<u64>> {
        let mut collections = self.collections.write().await;
        let Some(collection) = collections.get_mut(collection_name) else {
            return Ok(Reply::failed(not_found(collection_name)));
        };
        let expr = match Expr::parse(expr) {
            Ok(expr) => expr,
            Err(err) => return Ok(Reply::failed(illegal(err.to_string()))),
        };

        let before = collection.rows.len();
        collection.rows.retain(|row| !expr.matches(&row.scalars));
        Ok(Reply::ok((before - collection.rows.len()) as u64))
    }

    async fn search(&self, query: SearchQuery) -> VectorResult<Reply<RawSearchResults>> {
        self.counters.searches.fetch_add(1, Ordering::SeqCst);

        let collections = self.collections.read().await;
        let Some(collection) = collections.get(query.collection_name()) else {
            return Ok(Reply::failed(not_found(query.collection_name())));
        };
        if !collection.loaded {
            return Ok(Reply::failed(Status::error(
                StatusCode::CollectionNotLoaded,
                format!("collection not loaded: {}", query.collection_name()),
            )));
        }

        match collection.spec.field(query.vector_field()) {
            Some(field) if field.kind.dimension() == Some(query.dimension() as u32) => {}
            Some(_) => {
                return Ok(Reply::failed(illegal(format!(
                    "query dimension {} does not match field {}",
                    query.dimension(),
                    query.vector_field()
                ))));
            }
            None => {
                return Ok(Reply::failed(illegal(format!(
                    "field {} does not exist",
                    query.vector_field()
                ))));
            }
        }
        if let Some(missing) = query
            .partition_names()
            .iter()
            .find(|p| !collection.partitions.contains(*p))
        {
            return Ok(Reply::failed(Status::error(
                StatusCode::PartitionNotFound,
                format!("partition not found: {}", missing),
            )));
        }
        let mut output = Vec::with_capacity(query.output_fields().len());
        for name in query.output_fields() {
            match collection.spec.field(name) {
                Some(field) => output.push(field),
                None => return Ok(Reply::failed(illegal(format!("field {} does not exist", name)))),
            }
        }

        let candidates: Vec<&StoredRow> = collection
            .rows
            .iter()
            .filter(|row| {
                query.partition_names().is_empty()
                    || query.partition_names().contains(&row.partition)
            })
            .filter(|row| query.filter().is_none_or(|expr| expr.matches(&row.scalars)))
            .collect();

        let metric = query.metric();
        let mut topks = Vec::with_capacity(query.num_queries());
        let mut hits: Vec<(&StoredRow, f32)> = Vec::new();
        for vector in query.vectors() {
            let mut scored: Vec<(&StoredRow, f32)> = candidates
                .iter()
                .filter_map(|row| {
                    row.vectors
                        .get(query.vector_field())
                        .map(|stored| (*row, score(metric, vector, stored)))
                })
                .collect();
            scored.sort_by(|a, b| {
                let ordering = a.1.total_cmp(&b.1);
                if metric.higher_is_closer() { ordering.reverse() } else { ordering }
            });
            scored.truncate(query.top_k());
            topks.push(scored.len());
            hits.extend(scored);
        }

        let rows: Vec<&StoredRow> = hits.iter().map(|(row, _)| *row).collect();
        let fields_data = output
            .iter()
            .map(|field| typed_column(&field.name, &field.kind, &rows))
            .collect();

        Ok(Reply::ok(RawSearchResults {
            num_queries: query.num_queries(),
            topks,
            ids: rows.iter().map(|r| r.id).collect(),
            scores: hits.iter().map(|(_, s)| *s).collect(),
            fields_data,
        }))
    }

    async fn show_partitions(&self, collection_name: &str) -> VectorResult<Reply<Vec<Vec<u8>>>> {
        let collections = self.collections.read().await;
        Ok(match collections.get(collection_name) {
            Some(collection) => Reply::ok(
                collection
                    .partitions
                    .iter()
                    .map(|p| p.as_bytes().to_vec())
                    .collect(),
            ),
            None => Reply::failed(not_found(collection_name)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldSpec;
    use crate::query::QueryParams;

    fn spec() -> CollectionSpec {
        CollectionSpec::new(
            "docs",
            vec![
                FieldSpec::primary_key("id", true),
                FieldSpec::scalar("status", FieldKind::Int32),
                FieldSpec::vector("embedding", 2),
            ],
        )
    }

    async fn seeded() -> InMemoryVectorBackend {
        let backend = InMemoryVectorBackend::new();
        backend.create_collection(spec()).await.unwrap().check("create").unwrap();
        backend
            .insert(InsertRequest {
                collection_name: "docs".to_string(),
                partition_name: None,
                fields: vec![
                    FieldColumn::new("status", FieldData::Int32(vec![1, 2, 1])),
                    FieldColumn::new(
                        "embedding",
                        FieldData::FloatVector(vec![
                            vec![1.0, 0.0],
                            vec![0.0, 1.0],
                            vec![0.7, 0.7],
                        ]),
                    ),
                ],
            })
            .await
            .unwrap()
            .into_data("insert")
            .unwrap();
        backend
    }

    fn query(top_k: usize, filter: Option<&str>) -> SearchQuery {
        let mut params = QueryParams::new("docs", "embedding", vec![vec![1.0, 0.0]], top_k);
        params.filter = filter.map(str::to_string);
        params.output_fields = vec!["status".to_string()];
        SearchQuery::new(params).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_collection_reports_status() {
        let backend = seeded().await;
        let status = backend.create_collection(spec()).await.unwrap();
        assert_eq!(status.code, StatusCode::CollectionAlreadyExists);
    }

    #[tokio::test]
    async fn test_search_requires_load() {
        let backend = seeded().await;
        let reply = backend.search(query(2, None)).await.unwrap();
        assert_eq!(reply.status.code, StatusCode::CollectionNotLoaded);
    }

    #[tokio::test]
    async fn test_search_ranks_by_inner_product() {
        let backend = seeded().await;
        backend.load_collection("docs").await.unwrap();

        let raw = backend.search(query(2, None)).await.unwrap().into_data("search").unwrap();
        assert_eq!(raw.topks, vec![2]);
        assert_eq!(raw.ids, vec![1, 3]);
        assert_eq!(raw.fields_data[0].data, FieldData::Int32(vec![1, 1]));
    }

    #[tokio::test]
    async fn test_search_applies_filter() {
        let backend = seeded().await;
        backend.load_collection("docs").await.unwrap();

        let raw = backend
            .search(query(5, Some("status == 2")))
            .await
            .unwrap()
            .into_data("search")
            .unwrap();
        assert_eq!(raw.ids, vec![2]);
    }

    #[tokio::test]
    async fn test_delete_by_expression() {
        let backend = seeded().await;
        let deleted = backend
            .delete("docs", "status == 1")
            .await
            .unwrap()
            .into_data("delete")
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(backend.row_count("docs").await, 1);
    }

    #[tokio::test]
    async fn test_insert_into_unknown_partition() {
        let backend = seeded().await;
        let reply = backend
            .insert(InsertRequest {
                collection_name: "docs".to_string(),
                partition_name: Some("missing".to_string()),
                fields: vec![FieldColumn::new(
                    "embedding",
                    FieldData::FloatVector(vec![vec![1.0, 0.0]]),
                )],
            })
            .await
            .unwrap();
        assert_eq!(reply.status.code, StatusCode::PartitionNotFound);
    }

    #[tokio::test]
    async fn test_rejected_insert_keeps_auto_ids() {
        let backend = seeded().await;
        let rejected = backend
            .insert(InsertRequest {
                collection_name: "docs".to_string(),
                partition_name: None,
                fields: vec![FieldColumn::new(
                    "embedding",
                    FieldData::FloatVector(vec![vec![1.0, 0.0], vec![1.0]]),
                )],
            })
            .await
            .unwrap();
        assert_eq!(rejected.status.code, StatusCode::IllegalArgument);
        assert_eq!(backend.row_count("docs").await, 3);

        let ids = backend
            .insert(InsertRequest {
                collection_name: "docs".to_string(),
                partition_name: None,
                fields: vec![FieldColumn::new(
                    "embedding",
                    FieldData::FloatVector(vec![vec![0.0, 1.0]]),
                )],
            })
            .await
            .unwrap()
            .into_data("insert")
            .unwrap();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn test_l2_ranks_ascending() {
        let near = score(MetricType::L2, &[0.0, 0.0], &[1.0, 0.0]);
        let far = score(MetricType::L2, &[0.0, 0.0], &[2.0, 0.0]);
        assert!(near < far);
        assert_eq!(score(MetricType::Cosine, &[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
