//! REST handlers for the vector search gateway

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::GatewayState;
use crate::backend::VectorBackend;
use crate::error::{ErrorResponse, VectorError, VectorResult};
use crate::models::{Hit, MutationResult, RecordId};

// ===== Request DTOs =====

/// Search a collection by free text
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchTextRequest {
    pub collection_name: Option<String>,
    pub search_text: Option<String>,
    pub top_k: Option<usize>,
}

/// Search with a boolean scalar filter expression
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchWithFilterRequest {
    pub collection_name: Option<String>,
    pub vectors: Option<Vec<Vec<f32>>>,
    pub top_k: Option<usize>,
    /// Filter expression, e.g. `status == 1 and year >= 2020`
    pub exp: Option<String>,
}

/// Search restricted to a set of partitions
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchAsyncRequest {
    pub collection_name: Option<String>,
    pub vectors: Option<Vec<Vec<f32>>>,
    pub partition_list: Option<Vec<String>>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PartitionsParams {
    pub collection_name: Option<String>,
}

/// Embed and insert one record per text
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertTextsRequest {
    pub collection_name: Option<String>,
    #[serde(default)]
    pub partition_name: Option<String>,
    pub texts: Option<Vec<String>>,
}

/// Delete records matching an expression
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordsRequest {
    pub collection_name: Option<String>,
    pub expr: Option<String>,
}

fn required<T>(value: Option<T>, name: &str) -> VectorResult<T> {
    value.ok_or_else(|| VectorError::validation(format!("{} is required", name)))
}

// ===== Search =====

/// Search a collection by text
#[utoipa::path(
    post,
    path = "/search",
    tag = "vector-search",
    request_body = SearchTextRequest,
    responses(
        (status = 200, description = "Ranked hits", body = Vec<Hit>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Backend or embedding failure", body = ErrorResponse)
    )
)]
pub async fn search_text<B: VectorBackend + 'static>(
    State(state): State<Arc<GatewayState<B>>>,
    Json(request): Json<SearchTextRequest>,
) -> VectorResult<Json<Vec<Hit>>> {
    let collection_name = required(request.collection_name, "collectionName")?;
    let text = required(request.search_text, "searchText")?;
    if text.trim().is_empty() {
        return Err(VectorError::validation("searchText must not be empty"));
    }
    let top_k = required(request.top_k, "topK")?;

    let hits = state
        .search
        .search_text(&collection_name, &text, top_k)
        .await?;
    Ok(Json(hits))
}

/// Filtered search, ranked ids per query vector
#[utoipa::path(
    post,
    path = "/searchWithFilter",
    tag = "vector-search",
    request_body = SearchWithFilterRequest,
    responses(
        (status = 200, description = "Ranked ids per query vector", body = Vec<Vec<i64>>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Backend failure", body = ErrorResponse)
    )
)]
pub async fn search_with_filter<B: VectorBackend + 'static>(
    State(state): State<Arc<GatewayState<B>>>,
    Json(request): Json<SearchWithFilterRequest>,
) -> VectorResult<Json<Vec<Vec<RecordId>>>> {
    let collection_name = required(request.collection_name, "collectionName")?;
    let vectors = required(request.vectors, "vectors")?;
    let top_k = required(request.top_k, "topK")?;
    let expr = required(request.exp, "exp")?;

    let ids = state
        .search
        .search_filtered(&collection_name, vectors, top_k, &expr)
        .await?;
    Ok(Json(ids))
}

/// Partition-restricted search
#[utoipa::path(
    post,
    path = "/searchAsync",
    tag = "vector-search",
    request_body = SearchAsyncRequest,
    responses(
        (status = 200, description = "Ranked ids per query vector", body = Vec<Vec<i64>>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 504, description = "Search timed out", body = ErrorResponse)
    )
)]
pub async fn search_async<B: VectorBackend + 'static>(
    State(state): State<Arc<GatewayState<B>>>,
    Json(request): Json<SearchAsyncRequest>,
) -> VectorResult<Json<Vec<Vec<RecordId>>>> {
    let collection_name = required(request.collection_name, "collectionName")?;
    let vectors = required(request.vectors, "vectors")?;
    let partitions = required(request.partition_list, "partitionList")?;
    let top_k = required(request.top_k, "topK")?;

    let timeout = state.search.config().search_timeout;
    let ids = state
        .search
        .search_async(&collection_name, vectors, partitions, top_k)?
        .wait(timeout)
        .await?;
    Ok(Json(ids))
}

// ===== Partitions =====

/// List partition names of a collection
#[utoipa::path(
    get,
    path = "/partitions",
    tag = "vector-search",
    params(PartitionsParams),
    responses(
        (status = 200, description = "Partition names", body = Vec<String>),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn list_partitions<B: VectorBackend + 'static>(
    State(state): State<Arc<GatewayState<B>>>,
    Query(params): Query<PartitionsParams>,
) -> VectorResult<Json<Vec<String>>> {
    let collection_name = required(params.collection_name, "collectionName")?;
    let names = state.partitions.list_partitions(&collection_name).await?;
    Ok(Json(names))
}

// ===== Records =====

/// Embed texts and insert them as records
#[utoipa::path(
    post,
    path = "/records/text",
    tag = "vector-search",
    request_body = InsertTextsRequest,
    responses(
        (status = 200, description = "Inserted records", body = MutationResult),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn insert_texts<B: VectorBackend + 'static>(
    State(state): State<Arc<GatewayState<B>>>,
    Json(request): Json<InsertTextsRequest>,
) -> VectorResult<Json<MutationResult>> {
    let collection_name = required(request.collection_name, "collectionName")?;
    let texts = required(request.texts, "texts")?;

    let result = state
        .mutations
        .insert_texts(&collection_name, request.partition_name.as_deref(), texts)
        .await?;
    Ok(Json(result))
}

/// Delete records matching a filter expression
#[utoipa::path(
    post,
    path = "/records/delete",
    tag = "vector-search",
    request_body = DeleteRecordsRequest,
    responses(
        (status = 200, description = "Deleted record count", body = MutationResult),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn delete_records<B: VectorBackend + 'static>(
    State(state): State<Arc<GatewayState<B>>>,
    Json(request): Json<DeleteRecordsRequest>,
) -> VectorResult<Json<MutationResult>> {
    let collection_name = required(request.collection_name, "collectionName")?;
    let expr = required(request.expr, "expr")?;

    let result = state
        .mutations
        .delete_records(&collection_name, &expr)
        .await?;
    Ok(Json(result))
}
