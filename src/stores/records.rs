// SPDX-License-Identifier: MIT

//! Typed operations over the document store.
//!
//! Provides high-level operations for:
//! - Users (profile + denormalized event ID sets)
//! - Events (full records including participants)

use crate::error::{AppError, Result};
use crate::models::{Event, User};
use crate::stores::{collections, Document, RecordStore};
use std::sync::Arc;

/// Typed wrapper around the raw document store.
#[derive(Clone)]
pub struct RecordDb {
    store: Arc<dyn RecordStore>,
}

impl RecordDb {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn to_document<T: serde::Serialize>(value: &T) -> Result<Document> {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(AppError::Store("record did not serialize to a document".to_string())),
            Err(e) => Err(AppError::Store(e.to_string())),
        }
    }

    fn from_document<T: serde::de::DeserializeOwned>(doc: Document) -> Result<T> {
        serde_json::from_value(serde_json::Value::Object(doc))
            .map_err(|e| AppError::Store(e.to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by UID. `Ok(None)` when the record is absent.
    pub async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        match self.store.get(collections::USERS, uid).await? {
            Some(doc) => Ok(Some(Self::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Create or update a user record.
    pub async fn set_user(&self, user: &User) -> Result<()> {
        let doc = Self::to_document(user)?;
        self.store.set_all(collections::USERS, &user.uid, doc).await
    }

    // ─── Event Operations ────────────────────────────────────────

    /// Get an event by ID. `Ok(None)` when the record is absent.
    pub async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        match self.store.get(collections::EVENTS, id).await? {
            Some(doc) => Ok(Some(Self::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Create or update an event record.
    pub async fn set_event(&self, event: &Event) -> Result<()> {
        let doc = Self::to_document(event)?;
        self.store.set_all(collections::EVENTS, &event.id, doc).await
    }

    /// Fetch the full event set.
    ///
    /// Documents that fail to decode are skipped with a warning rather
    /// than failing the whole scan; one malformed record must not make
    /// every session unloadable.
    pub async fn list_events(&self) -> Result<Vec<Event>> {
        let docs = self.store.list_all(collections::EVENTS).await?;
        let mut events = Vec::with_capacity(docs.len());
        for doc in docs {
            match Self::from_document::<Event>(doc) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable event record"),
            }
        }
        Ok(events)
    }
}
