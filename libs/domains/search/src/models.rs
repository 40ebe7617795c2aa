use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{VectorError, VectorResult};

/// Primary key of a record in the index backend
pub type RecordId = i64;

/// Name of the partition every collection starts with
pub const DEFAULT_PARTITION: &str = "_default";

/// Distance metric used to rank candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    /// Euclidean distance, smaller is closer
    L2,
    /// Inner product, larger is closer
    #[default]
    IP,
    /// Cosine similarity, larger is closer
    Cosine,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::IP => "IP",
            MetricType::Cosine => "COSINE",
        }
    }

    /// Whether a larger score ranks first
    pub fn higher_is_closer(&self) -> bool {
        !matches!(self, MetricType::L2)
    }
}

impl FromStr for MetricType {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(MetricType::L2),
            "IP" => Ok(MetricType::IP),
            "COSINE" => Ok(MetricType::Cosine),
            other => Err(VectorError::validation(format!(
                "Unknown metric type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility guarantee for recently written data at query time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ConsistencyLevel {
    Strong,
    Session,
    Bounded,
    Eventually,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::Bounded => "Bounded",
            ConsistencyLevel::Eventually => "Eventually",
        }
    }
}

/// Type of a collection field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    Float,
    Double,
    VarChar { max_length: u32 },
    FloatVector { dim: u32 },
}

impl FieldKind {
    pub fn is_vector(&self) -> bool {
        matches!(self, FieldKind::FloatVector { .. })
    }

    pub fn dimension(&self) -> Option<u32> {
        match self {
            FieldKind::FloatVector { dim } => Some(*dim),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "Bool",
            FieldKind::Int32 => "Int32",
            FieldKind::Int64 => "Int64",
            FieldKind::Float => "Float",
            FieldKind::Double => "Double",
            FieldKind::VarChar { .. } => "VarChar",
            FieldKind::FloatVector { .. } => "FloatVector",
        }
    }
}

/// A field declaration in a collection schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub auto_id: bool,
}

impl FieldSpec {
    pub fn primary_key(name: impl Into<String>, auto_id: bool) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Int64,
            is_primary: true,
            auto_id,
        }
    }

    pub fn scalar(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_primary: false,
            auto_id: false,
        }
    }

    pub fn vector(name: impl Into<String>, dim: u32) -> Self {
        Self::scalar(name, FieldKind::FloatVector { dim })
    }
}

/// Collection definition: created once, schema immutable afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub shards_num: u32,
    pub fields: Vec<FieldSpec>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shards_num: 1,
            fields,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_shards(mut self, shards_num: u32) -> Self {
        self.shards_num = shards_num;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.kind.is_vector())
    }

    /// Check the schema invariants the backend would otherwise reject
    pub fn validate(&self) -> VectorResult<()> {
        if self.name.trim().is_empty() {
            return Err(VectorError::validation("collectionName is required"));
        }
        if self.shards_num == 0 {
            return Err(VectorError::validation("shardsNum must be at least 1"));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(VectorError::validation("field names must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(VectorError::validation(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
            if field.kind.dimension() == Some(0) {
                return Err(VectorError::validation(format!(
                    "vector field {} must have a positive dimension",
                    field.name
                )));
            }
        }

        let primaries: Vec<&FieldSpec> = self.fields.iter().filter(|f| f.is_primary).collect();
        match primaries.as_slice() {
            [pk] if pk.kind == FieldKind::Int64 => {}
            [pk] => {
                return Err(VectorError::validation(format!(
                    "primary key {} must be Int64",
                    pk.name
                )));
            }
            _ => {
                return Err(VectorError::validation(
                    "collection must declare exactly one primary key",
                ));
            }
        }

        if self.vector_fields().next().is_none() {
            return Err(VectorError::validation(
                "collection must declare at least one vector field",
            ));
        }

        Ok(())
    }
}

/// A scalar value, as stored in a record or written in a filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Bool(b) => serde_json::Value::Bool(b),
            FieldValue::Int(i) => serde_json::Value::from(i),
            FieldValue::Float(f) => serde_json::Value::from(f),
            FieldValue::String(s) => serde_json::Value::String(s),
        }
    }
}

/// Column-oriented field data, the layout used for inserts and raw search output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum FieldData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    VarChar(Vec<String>),
    FloatVector(Vec<Vec<f32>>),
}

impl FieldData {
    pub fn len(&self) -> usize {
        match self {
            FieldData::Bool(v) => v.len(),
            FieldData::Int32(v) => v.len(),
            FieldData::Int64(v) => v.len(),
            FieldData::Float(v) => v.len(),
            FieldData::Double(v) => v.len(),
            FieldData::VarChar(v) => v.len(),
            FieldData::FloatVector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldData::Bool(_) => "Bool",
            FieldData::Int32(_) => "Int32",
            FieldData::Int64(_) => "Int64",
            FieldData::Float(_) => "Float",
            FieldData::Double(_) => "Double",
            FieldData::VarChar(_) => "VarChar",
            FieldData::FloatVector(_) => "FloatVector",
        }
    }

    /// Whether this column can be stored in a field of the given kind
    pub fn matches(&self, kind: &FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldData::Bool(_), FieldKind::Bool)
                | (FieldData::Int32(_), FieldKind::Int32)
                | (FieldData::Int64(_), FieldKind::Int64)
                | (FieldData::Float(_), FieldKind::Float)
                | (FieldData::Double(_), FieldKind::Double)
                | (FieldData::VarChar(_), FieldKind::VarChar { .. })
                | (FieldData::FloatVector(_), FieldKind::FloatVector { .. })
        )
    }

    /// Scalar value at `row`; `None` for vector columns or out of range
    pub fn scalar_at(&self, row: usize) -> Option<FieldValue> {
        match self {
            FieldData::Bool(v) => v.get(row).map(|b| FieldValue::Bool(*b)),
            FieldData::Int32(v) => v.get(row).map(|i| FieldValue::Int(i64::from(*i))),
            FieldData::Int64(v) => v.get(row).map(|i| FieldValue::Int(*i)),
            FieldData::Float(v) => v.get(row).map(|f| FieldValue::Float(f64::from(*f))),
            FieldData::Double(v) => v.get(row).map(|f| FieldValue::Float(*f)),
            FieldData::VarChar(v) => v.get(row).map(|s| FieldValue::String(s.clone())),
            FieldData::FloatVector(_) => None,
        }
    }

    /// JSON rendering of the value at `row`
    pub fn json_at(&self, row: usize) -> Option<serde_json::Value> {
        match self {
            FieldData::FloatVector(v) => v.get(row).map(|values| serde_json::json!(values)),
            _ => self.scalar_at(row).map(Into::into),
        }
    }

    /// Infer a typed column from JSON values, as returned by row-oriented APIs
    pub fn from_json_column(name: &str, values: Vec<serde_json::Value>) -> VectorResult<Self> {
        use serde_json::Value;

        let mismatch = || VectorError::decode(format!("field {} has mixed value types", name));

        let Some(first) = values.iter().find(|v| !v.is_null()) else {
            return if values.is_empty() {
                Ok(FieldData::VarChar(Vec::new()))
            } else {
                Err(VectorError::decode(format!("field {} has only null values", name)))
            };
        };

        match first {
            Value::Bool(_) => values
                .iter()
                .map(|v| v.as_bool().ok_or_else(mismatch))
                .collect::<VectorResult<_>>()
                .map(FieldData::Bool),
            Value::Number(_) if values.iter().all(|v| v.is_i64()) => values
                .iter()
                .map(|v| v.as_i64().ok_or_else(mismatch))
                .collect::<VectorResult<_>>()
                .map(FieldData::Int64),
            Value::Number(_) => values
                .iter()
                .map(|v| v.as_f64().ok_or_else(mismatch))
                .collect::<VectorResult<_>>()
                .map(FieldData::Double),
            Value::String(_) => values
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(mismatch))
                .collect::<VectorResult<_>>()
                .map(FieldData::VarChar),
            Value::Array(_) => values
                .iter()
                .map(|v| {
                    v.as_array()
                        .ok_or_else(mismatch)?
                        .iter()
                        .map(|x| x.as_f64().map(|f| f as f32).ok_or_else(mismatch))
                        .collect::<VectorResult<Vec<f32>>>()
                })
                .collect::<VectorResult<_>>()
                .map(FieldData::FloatVector),
            _ => Err(VectorError::decode(format!(
                "field {} has an unsupported value type",
                name
            ))),
        }
    }
}

/// A named column of field data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldColumn {
    pub name: String,
    pub data: FieldData,
}

impl FieldColumn {
    pub fn new(name: impl Into<String>, data: FieldData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// One ranked candidate returned for a query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Hit {
    pub id: RecordId,
    pub score: f32,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    #[schema(value_type = Object)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Hits per query vector, in backend order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub queries: Vec<Vec<Hit>>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.queries.iter().all(Vec::is_empty)
    }

    /// Ranked identifiers per query vector
    pub fn ids(&self) -> Vec<Vec<RecordId>> {
        self.queries
            .iter()
            .map(|hits| hits.iter().map(|h| h.id).collect())
            .collect()
    }
}

/// Outcome of an insert or delete
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MutationResult {
    pub count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<RecordId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documents_spec() -> CollectionSpec {
        CollectionSpec::new(
            "pdf_data",
            vec![
                FieldSpec::primary_key("id", true),
                FieldSpec::scalar("content", FieldKind::VarChar { max_length: 4096 }),
                FieldSpec::scalar("content_word_count", FieldKind::Int32),
                FieldSpec::vector("content_vector", 4),
            ],
        )
    }

    #[test]
    fn test_valid_spec() {
        assert!(documents_spec().validate().is_ok());
    }

    #[test]
    fn test_spec_requires_primary_key() {
        let spec = CollectionSpec::new("c", vec![FieldSpec::vector("v", 4)]);
        assert!(matches!(spec.validate(), Err(VectorError::Validation(_))));
    }

    #[test]
    fn test_spec_requires_vector_field() {
        let spec = CollectionSpec::new("c", vec![FieldSpec::primary_key("id", true)]);
        assert!(matches!(spec.validate(), Err(VectorError::Validation(_))));
    }

    #[test]
    fn test_spec_rejects_duplicate_fields_and_zero_dim() {
        let mut spec = documents_spec();
        spec.fields.push(FieldSpec::vector("content_vector", 4));
        assert!(spec.validate().is_err());

        let spec = CollectionSpec::new(
            "c",
            vec![FieldSpec::primary_key("id", false), FieldSpec::vector("v", 0)],
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("ip".parse::<MetricType>().unwrap(), MetricType::IP);
        assert_eq!("Cosine".parse::<MetricType>().unwrap(), MetricType::Cosine);
        assert!("hamming".parse::<MetricType>().is_err());
        assert!(!MetricType::L2.higher_is_closer());
    }

    #[test]
    fn test_field_data_matches_kind() {
        assert!(FieldData::Int32(vec![1]).matches(&FieldKind::Int32));
        assert!(!FieldData::Int64(vec![1]).matches(&FieldKind::Int32));
        assert!(FieldData::FloatVector(vec![]).matches(&FieldKind::FloatVector { dim: 8 }));
    }

    #[test]
    fn test_from_json_column_infers_types() {
        let ints = FieldData::from_json_column("n", vec![1.into(), 2.into()]).unwrap();
        assert_eq!(ints, FieldData::Int64(vec![1, 2]));

        let floats = FieldData::from_json_column("f", vec![1.into(), 2.5.into()]).unwrap();
        assert_eq!(floats, FieldData::Double(vec![1.0, 2.5]));

        let mixed = FieldData::from_json_column("m", vec![1.into(), "a".into()]);
        assert!(matches!(mixed, Err(VectorError::Decode(_))));
    }

    #[test]
    fn test_search_result_ids() {
        let result = SearchResult {
            queries: vec![vec![
                Hit {
                    id: 7,
                    score: 0.9,
                    fields: Default::default(),
                },
                Hit {
                    id: 3,
                    score: 0.4,
                    fields: Default::default(),
                },
            ]],
        };
        assert_eq!(result.ids(), vec![vec![7, 3]]);
        assert!(!result.is_empty());
    }
}
