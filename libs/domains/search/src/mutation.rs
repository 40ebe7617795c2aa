use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use observability::SearchMetrics;
use tracing::instrument;

use crate::backend::{InsertRequest, VectorBackend, bounded};
use crate::config::DocumentCollectionConfig;
use crate::embedding::{EmbeddingProvider, validate_texts};
use crate::error::{VectorError, VectorResult};
use crate::expr::Expr;
use crate::models::{CollectionSpec, FieldColumn, FieldData, FieldKind, MutationResult};

/// Inserts and expression-based deletes. No retries; every backend call is
/// bounded by the configured mutation timeout.
pub struct DataMutationService<B: VectorBackend> {
    backend: Arc<B>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    text_fields: DocumentCollectionConfig,
    timeout: Duration,
}

/// Checks that need no schema: names, uniqueness, row counts
fn check_columns(collection_name: &str, fields: &[FieldColumn]) -> VectorResult<usize> {
    if collection_name.trim().is_empty() {
        return Err(VectorError::validation("collectionName is required"));
    }
    if fields.is_empty() {
        return Err(VectorError::validation("at least one field column is required"));
    }

    let mut seen = HashSet::new();
    for column in fields {
        if column.name.trim().is_empty() {
            return Err(VectorError::validation("field names must not be empty"));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(VectorError::validation(format!(
                "field {} is supplied more than once",
                column.name
            )));
        }
    }

    let rows = fields[0].data.len();
    if rows == 0 {
        return Err(VectorError::validation("field columns must not be empty"));
    }
    if let Some(column) = fields.iter().find(|c| c.data.len() != rows) {
        return Err(VectorError::validation(format!(
            "field {} has {} rows, expected {}",
            column.name,
            column.data.len(),
            rows
        )));
    }
    Ok(rows)
}

fn check_against_schema(spec: &CollectionSpec, fields: &[FieldColumn]) -> VectorResult<()> {
    for column in fields {
        let field = spec.field(&column.name).ok_or_else(|| {
            VectorError::validation(format!(
                "field {} is not part of collection {}",
                column.name, spec.name
            ))
        })?;

        if !column.data.matches(&field.kind) {
            return Err(VectorError::validation(format!(
                "field {} expects {}, got {}",
                column.name,
                field.kind.name(),
                column.data.type_name()
            )));
        }

        if let (FieldData::FloatVector(vectors), Some(dim)) = (&column.data, field.kind.dimension())
        {
            if let Some(row) = vectors.iter().position(|v| v.len() != dim as usize) {
                return Err(VectorError::validation(format!(
                    "field {} row {} has dimension {}, expected {}",
                    column.name,
                    row,
                    vectors[row].len(),
                    dim
                )));
            }
        }
    }

    if let Some(primary) = spec.primary_field() {
        let supplied = fields.iter().any(|c| c.name == primary.name);
        if primary.auto_id && supplied {
            return Err(VectorError::validation(format!(
                "primary key {} is assigned automatically and must not be supplied",
                primary.name
            )));
        }
        if !primary.auto_id && !supplied {
            return Err(VectorError::validation(format!(
                "primary key {} must be supplied",
                primary.name
            )));
        }
    }
    Ok(())
}

impl<B: VectorBackend> DataMutationService<B> {
    pub fn new(backend: Arc<B>, timeout: Duration) -> Self {
        Self {
            backend,
            embedder: None,
            text_fields: DocumentCollectionConfig::default(),
            timeout,
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    /// Names of the content and word-count fields derived by `insert_texts`
    pub fn with_text_fields(mut self, fields: DocumentCollectionConfig) -> Self {
        self.text_fields = fields;
        self
    }

    async fn schema(&self, collection_name: &str) -> VectorResult<CollectionSpec> {
        bounded(self.timeout, self.backend.describe_collection(collection_name))
            .await?
            .into_data("describe_collection")
    }

    async fn insert_checked(
        &self,
        spec: &CollectionSpec,
        partition_name: Option<&str>,
        fields: Vec<FieldColumn>,
    ) -> VectorResult<MutationResult> {
        check_against_schema(spec, &fields)?;

        let request = InsertRequest {
            collection_name: spec.name.clone(),
            partition_name: partition_name.map(str::to_string),
            fields,
        };
        let result = bounded(self.timeout, self.backend.insert(request))
            .await
            .and_then(|reply| reply.into_data("insert"));

        match result {
            Ok(ids) => {
                let count = ids.len() as u64;
                SearchMetrics::record_mutation("insert", "ok", count);
                tracing::info!(count, "Records inserted");
                Ok(MutationResult { count, ids })
            }
            Err(err) => {
                SearchMetrics::record_mutation("insert", err.kind(), 0);
                Err(err)
            }
        }
    }

    /// Insert column-oriented records after validating them against the schema
    #[instrument(skip(self, fields), fields(columns = fields.len()))]
    pub async fn insert_records(
        &self,
        collection_name: &str,
        partition_name: Option<&str>,
        fields: Vec<FieldColumn>,
    ) -> VectorResult<MutationResult> {
        check_columns(collection_name, &fields)?;
        if partition_name.is_some_and(|p| p.trim().is_empty()) {
            return Err(VectorError::validation("partitionName must not be empty"));
        }

        let spec = self.schema(collection_name).await?;
        self.insert_checked(&spec, partition_name, fields).await
    }

    /// Embed `texts` and insert one record per text.
    ///
    /// The content field receives the text and the word-count field its
    /// character count, each only when the schema declares it.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn insert_texts(
        &self,
        collection_name: &str,
        partition_name: Option<&str>,
        texts: Vec<String>,
    ) -> VectorResult<MutationResult> {
        if collection_name.trim().is_empty() {
            return Err(VectorError::validation("collectionName is required"));
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| VectorError::Config("no embedding provider configured".to_string()))?;
        validate_texts(&texts)?;

        let spec = self.schema(collection_name).await?;
        let vector_field = self.text_vector_field(&spec)?;

        let vectors = embedder.embed(&texts).await;
        SearchMetrics::record_embedding(
            &embedder.model_name(),
            if vectors.is_ok() { "ok" } else { "error" },
            texts.len(),
        );
        let vectors = vectors?;
        if vectors.len() != texts.len() {
            return Err(VectorError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let mut fields = Vec::with_capacity(3);
        if let Some(field) = spec.field(&self.text_fields.word_count_field) {
            let counts = texts.iter().map(|t| t.chars().count());
            let data = match field.kind {
                FieldKind::Int32 => FieldData::Int32(counts.map(|c| c as i32).collect()),
                FieldKind::Int64 => FieldData::Int64(counts.map(|c| c as i64).collect()),
                other => {
                    return Err(VectorError::validation(format!(
                        "word count field {} must be an integer, found {}",
                        field.name,
                        other.name()
                    )));
                }
            };
            fields.push(FieldColumn::new(field.name.clone(), data));
        }
        if let Some(field) = spec.field(&self.text_fields.content_field) {
            fields.push(FieldColumn::new(field.name.clone(), FieldData::VarChar(texts)));
        }
        fields.push(FieldColumn::new(vector_field, FieldData::FloatVector(vectors)));

        check_columns(collection_name, &fields)?;
        self.insert_checked(&spec, partition_name, fields).await
    }

    /// The single vector field, or the configured one when there are several
    fn text_vector_field(&self, spec: &CollectionSpec) -> VectorResult<String> {
        let vector_fields: Vec<_> = spec.vector_fields().collect();
        match vector_fields.as_slice() {
            [only] => Ok(only.name.clone()),
            many => many
                .iter()
                .find(|f| f.name == self.text_fields.vector_field)
                .map(|f| f.name.clone())
                .ok_or_else(|| {
                    VectorError::validation(format!(
                        "collection {} has no unambiguous vector field for text",
                        spec.name
                    ))
                }),
        }
    }

    /// Delete every record matching a boolean scalar expression
    #[instrument(skip(self))]
    pub async fn delete_records(
        &self,
        collection_name: &str,
        expr: &str,
    ) -> VectorResult<MutationResult> {
        if collection_name.trim().is_empty() {
            return Err(VectorError::validation("collectionName is required"));
        }
        if expr.trim().is_empty() {
            return Err(VectorError::validation("delete expression is required"));
        }
        let parsed = Expr::parse(expr)?;

        let result = bounded(
            self.timeout,
            self.backend.delete(collection_name, &parsed.to_string()),
        )
        .await
        .and_then(|reply| reply.into_data("delete"));

        match result {
            Ok(count) => {
                SearchMetrics::record_mutation("delete", "ok", count);
                tracing::info!(count, "Records deleted");
                Ok(MutationResult {
                    count,
                    ids: Vec::new(),
                })
            }
            Err(err) => {
                SearchMetrics::record_mutation("delete", err.kind(), 0);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockVectorBackend, Reply, Status, StatusCode};
    use crate::embedding::MockEmbeddingProvider;
    use crate::models::FieldSpec;

    fn documents() -> CollectionSpec {
        CollectionSpec::new(
            "pdf_data",
            vec![
                FieldSpec::primary_key("id", true),
                FieldSpec::scalar("content", FieldKind::VarChar { max_length: 1024 }),
                FieldSpec::scalar("content_word_count", FieldKind::Int32),
                FieldSpec::vector("content_vector", 2),
            ],
        )
    }

    fn backend_with_schema() -> MockVectorBackend {
        let mut backend = MockVectorBackend::new();
        backend
            .expect_describe_collection()
            .returning(|_| Ok(Reply::ok(documents())));
        backend
    }

    fn service(backend: MockVectorBackend) -> DataMutationService<MockVectorBackend> {
        DataMutationService::new(Arc::new(backend), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_local_validation_makes_no_backend_calls() {
        let service = service(MockVectorBackend::new());

        let err = service.insert_records("", None, vec![]).await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(_)));

        let duplicated = vec![
            FieldColumn::new("content", FieldData::VarChar(vec!["a".into()])),
            FieldColumn::new("content", FieldData::VarChar(vec!["b".into()])),
        ];
        let err = service.insert_records("pdf_data", None, duplicated).await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(_)));

        let ragged = vec![
            FieldColumn::new("content", FieldData::VarChar(vec!["a".into(), "b".into()])),
            FieldColumn::new("content_vector", FieldData::FloatVector(vec![vec![1.0, 0.0]])),
        ];
        let err = service.insert_records("pdf_data", None, ragged).await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_field_rejected_after_schema_lookup() {
        let service = service(backend_with_schema());
        let fields = vec![
            FieldColumn::new("title", FieldData::VarChar(vec!["a".into()])),
            FieldColumn::new("content_vector", FieldData::FloatVector(vec![vec![1.0, 0.0]])),
        ];
        let err = service.insert_records("pdf_data", None, fields).await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(msg) if msg.contains("title")));
    }

    #[tokio::test]
    async fn test_wrong_dimension_and_auto_id_rejected() {
        let service = service(backend_with_schema());

        let fields = vec![FieldColumn::new(
            "content_vector",
            FieldData::FloatVector(vec![vec![1.0, 0.0, 0.0]]),
        )];
        assert!(service.insert_records("pdf_data", None, fields).await.is_err());

        let fields = vec![
            FieldColumn::new("id", FieldData::Int64(vec![1])),
            FieldColumn::new("content_vector", FieldData::FloatVector(vec![vec![1.0, 0.0]])),
        ];
        let err = service.insert_records("pdf_data", None, fields).await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(msg) if msg.contains("automatically")));
    }

    #[tokio::test]
    async fn test_insert_texts_derives_fields() {
        let mut backend = backend_with_schema();
        backend
            .expect_insert()
            .times(1)
            .withf(|request| {
                request.fields.len() == 3
                    && request.fields[0].data == FieldData::Int32(vec![5, 3])
                    && request.fields[1].data
                        == FieldData::VarChar(vec!["héllo".into(), "abc".into()])
            })
            .returning(|_| Ok(Reply::ok(vec![11, 12])));

        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_model_name()
            .returning(|| "test-model".to_string());
        embedder
            .expect_embed()
            .times(1)
            .returning(|texts| Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect()));

        let service = service(backend).with_embedding_provider(Arc::new(embedder));
        let result = service
            .insert_texts("pdf_data", None, vec!["héllo".into(), "abc".into()])
            .await
            .unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.ids, vec![11, 12]);
    }

    #[tokio::test]
    async fn test_insert_texts_without_provider() {
        let service = service(MockVectorBackend::new());
        let err = service
            .insert_texts("pdf_data", None, vec!["a".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Config(_)));
    }

    #[tokio::test]
    async fn test_delete_requires_parseable_expression() {
        let service = service(MockVectorBackend::new());
        assert!(matches!(
            service.delete_records("pdf_data", "  ").await,
            Err(VectorError::Validation(_))
        ));
        assert!(matches!(
            service.delete_records("pdf_data", "id in [1, 2").await,
            Err(VectorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_sends_canonical_expression() {
        let mut backend = MockVectorBackend::new();
        backend
            .expect_delete()
            .times(1)
            .withf(|collection, expr| collection == "pdf_data" && expr == "id in [1, 2]")
            .returning(|_, _| Ok(Reply::ok(2)));

        let result = service(backend)
            .delete_records("pdf_data", "id in [1,2]")
            .await
            .unwrap();
        assert_eq!(result.count, 2);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let mut backend = MockVectorBackend::new();
        backend.expect_delete().returning(|_, _| {
            Ok(Reply::failed(Status::error(StatusCode::CollectionNotFound, "missing")))
        });

        let err = service(backend)
            .delete_records("nope", "id == 1")
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::BackendQueryFailure { code: 100, .. }));
    }
}
