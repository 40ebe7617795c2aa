use crate::error::{VectorError, VectorResult};
use crate::expr::Expr;
use crate::models::{ConsistencyLevel, MetricType};

/// Largest topK the backend accepts
pub const MAX_TOP_K: usize = 16_384;

/// Default search breadth when none is configured
pub const DEFAULT_NPROBE: u32 = 10;

/// Raw inputs for [`SearchQuery::new`]
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub collection_name: String,
    pub vectors: Vec<Vec<f32>>,
    pub top_k: usize,
    pub metric: MetricType,
    pub vector_field: String,
    pub filter: Option<String>,
    pub output_fields: Vec<String>,
    pub partition_names: Vec<String>,
    pub consistency: Option<ConsistencyLevel>,
    pub nprobe: u32,
}

impl QueryParams {
    pub fn new(
        collection_name: impl Into<String>,
        vector_field: impl Into<String>,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            vectors,
            top_k,
            metric: MetricType::default(),
            vector_field: vector_field.into(),
            filter: None,
            output_fields: Vec::new(),
            partition_names: Vec::new(),
            consistency: None,
            nprobe: DEFAULT_NPROBE,
        }
    }
}

/// A validated, immutable top-K query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    collection_name: String,
    vectors: Vec<Vec<f32>>,
    top_k: usize,
    metric: MetricType,
    vector_field: String,
    filter: Option<Expr>,
    output_fields: Vec<String>,
    partition_names: Vec<String>,
    consistency: Option<ConsistencyLevel>,
    nprobe: u32,
}

impl SearchQuery {
    /// The only way to build a query. Every check runs here, before any backend call.
    pub fn new(params: QueryParams) -> VectorResult<Self> {
        let QueryParams {
            collection_name,
            vectors,
            top_k,
            metric,
            vector_field,
            filter,
            output_fields,
            partition_names,
            consistency,
            nprobe,
        } = params;

        if collection_name.trim().is_empty() {
            return Err(VectorError::validation("collectionName is required"));
        }
        if vector_field.trim().is_empty() {
            return Err(VectorError::validation("vector field name is required"));
        }
        validate_vectors(&vectors)?;

        if top_k == 0 {
            return Err(VectorError::validation("topK must be greater than 0"));
        }
        if top_k > MAX_TOP_K {
            return Err(VectorError::validation(format!(
                "topK must not exceed {}",
                MAX_TOP_K
            )));
        }
        if nprobe == 0 {
            return Err(VectorError::validation("nprobe must be greater than 0"));
        }
        if output_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(VectorError::validation("output field names must not be empty"));
        }
        if partition_names.iter().any(|p| p.trim().is_empty()) {
            return Err(VectorError::validation("partition names must not be empty"));
        }

        let filter = match filter {
            Some(raw) if raw.trim().is_empty() => {
                return Err(VectorError::validation("filter expression must not be empty"));
            }
            Some(raw) => Some(Expr::parse(&raw)?),
            None => None,
        };

        Ok(Self {
            collection_name,
            vectors,
            top_k,
            metric,
            vector_field,
            filter,
            output_fields,
            partition_names,
            consistency,
            nprobe,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    pub fn vector_field(&self) -> &str {
        &self.vector_field
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn output_fields(&self) -> &[String] {
        &self.output_fields
    }

    pub fn partition_names(&self) -> &[String] {
        &self.partition_names
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
    }

    pub fn nprobe(&self) -> u32 {
        self.nprobe
    }

    pub fn num_queries(&self) -> usize {
        self.vectors.len()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }
}

/// Query vectors must be non-empty, uniformly sized and finite
pub fn validate_vectors(vectors: &[Vec<f32>]) -> VectorResult<()> {
    let Some(first) = vectors.first() else {
        return Err(VectorError::validation("at least one query vector is required"));
    };
    let dim = first.len();
    if dim == 0 {
        return Err(VectorError::validation("query vectors must not be empty"));
    }

    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != dim {
            return Err(VectorError::validation(format!(
                "query vector {} has dimension {}, expected {}",
                i,
                vector.len(),
                dim
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorError::validation(format!(
                "query vector {} contains non-finite values",
                i
            )));
        }
    }
    Ok(())
}
