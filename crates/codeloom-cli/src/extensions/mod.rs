//! Built-in extensions and their lookup by name.

pub mod filesystem;
pub mod test_files;

use std::sync::Arc;

use anyhow::Result;
use codeloom_cache::MultiLevelCache;
use codeloom_config::IdStrategy;
use codeloom_core::{ContentHashIdGenerator, IdGenerator, SequentialIdGenerator};
use codeloom_engine::Extension;

use self::filesystem::{FileFacts, FilesystemExtension};
use self::test_files::TestFilesExtension;

/// Names accepted in `pipeline.extensions`
pub const AVAILABLE: &[&str] = &[filesystem::NAME, test_files::NAME];

/// Shared resources handed to extensions that want them.
#[derive(Default, Clone)]
pub struct Resources {
    pub file_facts: Option<Arc<MultiLevelCache<FileFacts>>>,
}

/// Instantiate extensions in the given order.
pub fn resolve(names: &[String], resources: &Resources) -> Result<Vec<Arc<dyn Extension>>> {
    names
        .iter()
        .map(|name| create(name, resources))
        .collect()
}

fn create(name: &str, resources: &Resources) -> Result<Arc<dyn Extension>> {
    match name {
        filesystem::NAME => Ok(Arc::new(FilesystemExtension::new(
            resources.file_facts.clone(),
        ))),
        test_files::NAME => Ok(Arc::new(TestFilesExtension::new())),
        other => anyhow::bail!(
            "Unknown extension '{}' (available: {})",
            other,
            AVAILABLE.join(", ")
        ),
    }
}

/// Id generator for the configured strategy
pub fn id_generator(strategy: IdStrategy) -> Arc<dyn IdGenerator> {
    match strategy {
        IdStrategy::Sequential => Arc::new(SequentialIdGenerator::new()),
        IdStrategy::ContentHash => Arc::new(ContentHashIdGenerator),
    }
}
