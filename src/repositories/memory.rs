use super::{is_pdf, PaperStore, WriteOutcome};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory paper store for testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaperStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failing_writes: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryPaperStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file as if it had been downloaded earlier
    pub async fn insert(&self, name: &str, bytes: &[u8]) {
        self.files
            .write()
            .await
            .insert(name.to_string(), bytes.to_vec());
    }

    /// Make every write of `name` fail with an I/O error
    pub async fn fail_writes_to(&self, name: &str) {
        self.failing_writes.write().await.insert(name.to_string());
    }

    /// Contents of `name`, if present
    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(name).cloned()
    }

    /// Number of stored files, metadata included
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    async fn check_injected_failure(&self, name: &str) -> Result<()> {
        if self.failing_writes.read().await.contains(name) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected write failure for {name}"),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PaperStore for InMemoryPaperStore {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.read().await.contains_key(name))
    }

    async fn write_new(&self, name: &str, bytes: &[u8]) -> Result<WriteOutcome> {
        self.check_injected_failure(name).await?;

        let mut files = self.files.write().await;
        if files.contains_key(name) {
            return Ok(WriteOutcome::AlreadyExists);
        }
        files.insert(name.to_string(), bytes.to_vec());
        Ok(WriteOutcome::Written)
    }

    async fn replace(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.check_injected_failure(name).await?;
        self.files
            .write()
            .await
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn list_pdfs(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .files
            .read()
            .await
            .keys()
            .filter(|name| is_pdf(name))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn sweep_partials(&self) -> Result<usize> {
        Ok(0)
    }
}
