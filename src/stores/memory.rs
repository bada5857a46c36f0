// SPDX-License-Identifier: MIT

//! In-process implementations of the storage contracts.
//!
//! These back local development and the test suite, the same way the
//! production deployment wires in the real hosted store, vault and blob
//! service.

use crate::error::{AppError, Result};
use crate::stores::{BlobStore, CredentialVault, Document, RecordStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory document store. Collections are created on first write;
/// `list_all` returns documents in insertion order.
#[derive(Default)]
pub struct MemoryRecordStore {
    // collection -> ordered (id, fields) pairs
    collections: DashMap<String, Vec<(String, Document)>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(doc_id, _)| doc_id == id)
                .map(|(_, fields)| fields.clone())
        }))
    }

    async fn set_all(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|(doc_id, _)| doc_id == id) {
            Some((_, existing)) => *existing = fields,
            None => docs.push((id.to_string(), fields)),
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(mut docs) = self.collections.get_mut(collection) {
            docs.retain(|(doc_id, _)| doc_id != id);
        }
        Ok(())
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| docs.iter().map(|(_, fields)| fields.clone()).collect())
            .unwrap_or_default())
    }
}

/// In-memory credential vault.
#[derive(Default)]
pub struct MemoryVault {
    entries: DashMap<String, String>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialVault for MemoryVault {
    fn save(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// In-memory blob store. Locators are `blob://images/<n>`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
    next_id: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob with this locator currently exists.
    pub fn contains(&self, locator: &str) -> bool {
        self.blobs.contains_key(locator)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let locator = format!("blob://images/{}", id);
        self.blobs.insert(locator.clone(), bytes);
        Ok(locator)
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        self.blobs
            .remove(locator)
            .map(|_| ())
            .ok_or_else(|| AppError::Blob(format!("No blob at {}", locator)))
    }
}
