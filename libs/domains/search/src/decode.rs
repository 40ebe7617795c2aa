//! Engine-native search output to per-query hits and typed records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::backend::RawSearchResults;
use crate::error::{VectorError, VectorResult};
use crate::models::{Hit, RecordId, SearchResult};

/// Declarative field mapping for a typed search record.
///
/// `FIELDS` are requested as output fields; each hit is deserialized from an
/// object holding those fields plus `id` and `score`.
pub trait OutputFields: DeserializeOwned + Send + 'static {
    const FIELDS: &'static [&'static str];

    fn output_fields() -> Vec<String> {
        Self::FIELDS.iter().map(|f| f.to_string()).collect()
    }
}

/// Split flattened results into hits per query vector.
///
/// Order is the backend's. A query with more than `top_k` hits is truncated.
pub fn split_hits(raw: RawSearchResults, top_k: usize) -> VectorResult<SearchResult> {
    if !raw.has_results() {
        return Ok(SearchResult {
            queries: vec![Vec::new(); raw.num_queries],
        });
    }

    let total: usize = raw.topks.iter().sum();
    if raw.topks.len() != raw.num_queries {
        return Err(VectorError::decode(format!(
            "expected {} per-query hit counts, got {}",
            raw.num_queries,
            raw.topks.len()
        )));
    }
    if total != raw.ids.len() || raw.scores.len() != raw.ids.len() {
        return Err(VectorError::decode(format!(
            "hit counts sum to {} but got {} ids and {} scores",
            total,
            raw.ids.len(),
            raw.scores.len()
        )));
    }
    if let Some(column) = raw.fields_data.iter().find(|c| c.data.len() != raw.ids.len()) {
        return Err(VectorError::decode(format!(
            "output field {} has {} values for {} hits",
            column.name,
            column.data.len(),
            raw.ids.len()
        )));
    }

    let mut queries = Vec::with_capacity(raw.num_queries);
    let mut offset = 0;
    for (query_index, &count) in raw.topks.iter().enumerate() {
        if count > top_k {
            tracing::warn!(
                query_index,
                returned = count,
                top_k,
                "Backend returned more hits than requested, truncating"
            );
        }

        let hits = (offset..offset + count.min(top_k))
            .map(|row| Hit {
                id: raw.ids[row],
                score: raw.scores[row],
                fields: raw
                    .fields_data
                    .iter()
                    .filter_map(|column| {
                        column
                            .data
                            .json_at(row)
                            .map(|value| (column.name.clone(), value))
                    })
                    .collect(),
            })
            .collect();
        queries.push(hits);
        offset += count;
    }

    Ok(SearchResult { queries })
}

/// Decode every hit of every query into `T`
pub fn decode_rows<T: OutputFields>(result: SearchResult) -> VectorResult<Vec<Vec<T>>> {
    result
        .queries
        .into_iter()
        .map(|hits| hits.into_iter().map(decode_hit::<T>).collect())
        .collect()
}

fn decode_hit<T: OutputFields>(hit: Hit) -> VectorResult<T> {
    let id = hit.id;
    let mut object = hit.fields;
    object.insert("id".to_string(), serde_json::Value::from(hit.id));
    object.insert("score".to_string(), serde_json::Value::from(hit.score));

    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| VectorError::decode(format!("hit {}: {}", id, e)))
}

/// A hit in the document collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentHit {
    pub id: RecordId,
    pub content: String,
    pub content_word_count: i32,
    pub score: f32,
}

impl OutputFields for DocumentHit {
    const FIELDS: &'static [&'static str] = &["id", "content", "content_word_count"];
}
