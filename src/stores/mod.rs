// SPDX-License-Identifier: MIT

//! Storage layer: collaborator contracts and the typed record wrapper.
//!
//! The document store, blob store and credential vault are external
//! collaborators; the core only depends on the traits defined here.

pub mod memory;
pub mod records;

pub use memory::{MemoryBlobStore, MemoryRecordStore, MemoryVault};
pub use records::RecordDb;

use crate::error::Result;
use async_trait::async_trait;

/// A stored document: flat field map, as the document store returns it.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const EVENTS: &str = "events";
}

/// Credential vault keys for silent re-authentication.
pub mod vault_keys {
    pub const IDENTITY: &str = "session.identity";
    pub const SECRET: &str = "session.secret";
}

/// Document-style external store for user and event records.
///
/// No cross-document transaction primitive is assumed; paired writes are
/// two independent calls and the coordinator handles partial failure.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;
    async fn set_all(&self, collection: &str, id: &str, fields: Document) -> Result<()>;
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
    /// Full collection scan. The store's query model is scan-based rather
    /// than indexed; membership is resolved client-side.
    async fn list_all(&self, collection: &str) -> Result<Vec<Document>>;
}

/// Secure local key/value store for the credentials needed to silently
/// re-authenticate. No transactional guarantee across keys.
pub trait CredentialVault: Send + Sync {
    fn save(&self, key: &str, value: &str);
    fn read(&self, key: &str) -> Option<String>;
    fn delete(&self, key: &str);
}

/// Binary blob store for profile and event images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload raw bytes; returns the locator the blob can be fetched by.
    async fn upload(&self, bytes: Vec<u8>) -> Result<String>;
    async fn delete(&self, locator: &str) -> Result<()>;
}
