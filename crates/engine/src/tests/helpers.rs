use std::sync::Arc;

use config::IngestConfig;
use storage::{MemoryStore, ObjectStore};

use crate::Ingestor;

pub const RAW: &str = "raw-uploads";

pub fn memory_ingestor(config: IngestConfig) -> (MemoryStore, Ingestor) {
    let store = MemoryStore::new();
    let ingestor = Ingestor::new(Arc::new(store.clone()), config).unwrap();
    (store, ingestor)
}

pub fn merged_lines(store: &MemoryStore, config: &IngestConfig) -> Vec<String> {
    store
        .lines(&config.output_container, &config.merged_name)
        .unwrap_or_default()
}

/// Staging objects left in the output container.
pub fn staging_objects(store: &MemoryStore, config: &IngestConfig) -> Vec<String> {
    let prefix = format!("{}.", config.staging_name);
    store
        .list(&config.output_container)
        .unwrap_or_default()
        .into_iter()
        .filter(|n| n.starts_with(&prefix))
        .collect()
}
