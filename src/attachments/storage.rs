//! Byte-level access to stored files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::Error;
use crate::Result;

/// A file as kept in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Read-only file storage keyed by reference path.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<StoredFile>;
}

/// Upload area and managed documents on the local filesystem.
///
/// `/uploads/<path>` maps into the upload directory; `/api/documents/<id>`
/// maps to the file in the documents directory whose stem is `<id>`.
pub struct LocalFileStore {
    upload_dir: PathBuf,
    documents_dir: PathBuf,
    upload_prefix: String,
    document_prefix: String,
}

impl LocalFileStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            documents_dir: config.documents_dir.clone(),
            upload_prefix: config.upload_prefix.clone(),
            document_prefix: config.document_prefix.clone(),
        }
    }

    async fn read_upload(&self, relative: &str) -> Result<StoredFile> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Storage(format!("invalid upload path {:?}", relative)));
        }

        let path = self.upload_dir.join(relative);
        let file_name = file_name_of(&path);
        debug!("Reading upload {:?}", path);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("cannot read {}: {}", file_name, e)))?;
        Ok(StoredFile { file_name, bytes })
    }

    async fn read_document(&self, id: &str) -> Result<StoredFile> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(Error::Storage(format!("invalid document id {:?}", id)));
        }

        let mut entries = tokio::fs::read_dir(&self.documents_dir)
            .await
            .map_err(|e| Error::Storage(format!("cannot list documents: {}", e)))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) != Some(id) {
                continue;
            }
            debug!("Reading document {} from {:?}", id, path);
            let bytes = tokio::fs::read(&path).await?;
            return Ok(StoredFile {
                file_name: file_name_of(&path),
                bytes,
            });
        }

        Err(Error::Storage(format!("document {} not found", id)))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn fetch(&self, reference: &str) -> Result<StoredFile> {
        let path = reference.split(['?', '#']).next().unwrap_or(reference);

        if let Some(rest) = path.strip_prefix(&self.upload_prefix) {
            return self.read_upload(rest).await;
        }
        if let Some(id) = path.strip_prefix(&self.document_prefix) {
            return self.read_document(id.trim_end_matches('/')).await;
        }

        Err(Error::Storage(format!("unsupported file reference {}", reference)))
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files held in memory, keyed by reference.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: HashMap<String, StoredFile>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(
            reference.into(),
            StoredFile {
                file_name: file_name.into(),
                bytes,
            },
        );
    }

    pub fn with(mut self, reference: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.insert(reference, file_name, bytes.to_vec());
        self
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn fetch(&self, reference: &str) -> Result<StoredFile> {
        self.files
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("{} not found", reference)))
    }
}
