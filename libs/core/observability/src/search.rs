//! Vector search metrics.

use metrics::{counter, gauge, histogram};

/// Search, mutation, lifecycle and embedding metrics recorder
pub struct SearchMetrics;

impl SearchMetrics {
    /// Record one completed search. `shape` names the query shape
    /// (`unfiltered`, `filtered`, `partitioned`, `documents`, `text`, `decoded`).
    pub fn record_search(shape: &'static str, outcome: &'static str, hits: usize, seconds: f64) {
        counter!("vector_searches_total", "shape" => shape, "outcome" => outcome).increment(1);
        histogram!("vector_search_duration_seconds", "shape" => shape).record(seconds);
        if outcome == "ok" {
            histogram!("vector_search_hits", "shape" => shape).record(hits as f64);
        }

        tracing::debug!(shape, outcome, hits, seconds, "Search completed");
    }

    pub fn record_mutation(operation: &'static str, outcome: &'static str, records: u64) {
        counter!("vector_mutations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        if records > 0 {
            counter!("vector_records_mutated_total", "operation" => operation).increment(records);
        }
    }

    pub fn set_active_loads(collection: &str, count: usize) {
        gauge!("vector_collection_active_loads", "collection" => collection.to_string())
            .set(count as f64);
    }

    /// `action` is `load` or `release`
    pub fn record_physical_load(collection: &str, action: &'static str) {
        counter!(
            "vector_collection_loads_total",
            "collection" => collection.to_string(),
            "action" => action
        )
        .increment(1);
    }

    pub fn record_embedding(model: &str, outcome: &'static str, texts: usize) {
        counter!(
            "embedding_requests_total",
            "model" => model.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("embedding_texts").record(texts as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        SearchMetrics::record_search("unfiltered", "ok", 3, 0.01);
        SearchMetrics::record_mutation("insert", "ok", 2);
        SearchMetrics::set_active_loads("docs", 1);
        SearchMetrics::record_physical_load("docs", "load");
        SearchMetrics::record_embedding("text-embedding-3-small", "error", 1);
    }
}
