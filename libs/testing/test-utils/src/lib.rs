//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for the search domain:
//! - `TestMilvus`: in-process fake of the Milvus REST v2 API
//! - `TestDataBuilder`: Deterministic test data generation
//! - `assertions`: Custom assertion helpers
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDataBuilder, TestMilvus};
//!
//! #[tokio::test]
//! async fn my_milvus_test() {
//!     let milvus = TestMilvus::start().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let collection = builder.name("collection", "main");
//!     let vectors = builder.vectors(3, 8);
//! }
//! ```

mod milvus;

pub use milvus::TestMilvus;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded random data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_search_documents");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique name for testing
    ///
    /// Names only contain characters valid in collection and partition names.
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.name("collection", "main"), "test_collection_7_main");
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test_{}_{}_{}", prefix, self.seed, suffix)
    }

    /// Unit-length vector number `index` of dimension `dim`
    pub fn vector(&self, index: usize, dim: usize) -> Vec<f32> {
        let mut state = self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let raw: Vec<f32> = (0..dim)
            .map(|_| {
                state = splitmix64(state);
                // top 24 bits map exactly onto f32 in [-1, 1)
                ((state >> 40) as f32 / (1u64 << 23) as f32) - 1.0
            })
            .collect();

        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return raw;
        }
        raw.into_iter().map(|v| v / norm).collect()
    }

    /// `count` distinct unit-length vectors
    pub fn vectors(&self, count: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..count).map(|i| self.vector(i, dim)).collect()
    }

    /// `count` distinct non-empty texts
    pub fn texts(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("document {} of test {}", i, self.seed))
            .collect()
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert one result list per query, none longer than `top_k`
    pub fn assert_per_query_within<T>(results: &[Vec<T>], queries: usize, top_k: usize) {
        assert_eq!(
            results.len(),
            queries,
            "expected {} result lists, got {}",
            queries,
            results.len()
        );
        for (index, hits) in results.iter().enumerate() {
            assert!(
                hits.len() <= top_k,
                "query {}: {} hits exceeds top_k {}",
                index,
                hits.len(),
                top_k
            );
        }
    }
}
