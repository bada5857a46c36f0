// SPDX-License-Identifier: MIT

//! Shared fakes for the integration tests: call-counting, failure-injecting
//! implementations of every collaborator contract.

// Each test binary uses a different subset of the fakes.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use muster_core::config::Config;
use muster_core::error::{AppError, Result};
use muster_core::models::{Event, EventDraft, GeoPoint, User};
use muster_core::services::{FetchTransport, Geocoder, IdentityClient, IdentityErrorKind, Placemark};
use muster_core::stores::{BlobStore, Document, MemoryBlobStore, MemoryRecordStore, MemoryVault, RecordStore};
use muster_core::Session;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ─── Identity provider stub ──────────────────────────────────────

/// Identity provider stub with configurable accounts, per-identity
/// latency and injectable failures.
#[derive(Default)]
pub struct StubIdentity {
    // identity -> (secret, uid)
    accounts: DashMap<String, (String, String)>,
    pub auth_delays_ms: DashMap<String, u64>,
    pub sign_out_error: Mutex<Option<IdentityErrorKind>>,
    pub change_email_error: Mutex<Option<IdentityErrorKind>>,
    pub changed_emails: Mutex<Vec<String>>,
    pub authenticate_calls: AtomicUsize,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, identity: &str, secret: &str, uid: &str) -> Self {
        self.accounts
            .insert(identity.to_string(), (secret.to_string(), uid.to_string()));
        self
    }
}

#[async_trait]
impl IdentityClient for StubIdentity {
    async fn register(
        &self,
        identity: &str,
        secret: &str,
    ) -> std::result::Result<String, IdentityErrorKind> {
        if identity.is_empty() || secret.is_empty() {
            return Err(IdentityErrorKind::InvalidInput);
        }
        if self.accounts.contains_key(identity) {
            return Err(IdentityErrorKind::AlreadyExists);
        }
        let uid = format!("uid-{}", identity);
        self.accounts
            .insert(identity.to_string(), (secret.to_string(), uid.clone()));
        Ok(uid)
    }

    async fn authenticate(
        &self,
        identity: &str,
        secret: &str,
    ) -> std::result::Result<String, IdentityErrorKind> {
        if let Some(delay) = self.auth_delays_ms.get(identity) {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
        }
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        match self.accounts.get(identity) {
            None => Err(IdentityErrorKind::NotFound),
            Some(entry) if entry.0 != secret => Err(IdentityErrorKind::BadCredential),
            Some(entry) => Ok(entry.1.clone()),
        }
    }

    async fn sign_out(&self) -> std::result::Result<(), IdentityErrorKind> {
        match *self.sign_out_error.lock().unwrap() {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }

    async fn change_email(&self, new_email: &str) -> std::result::Result<(), IdentityErrorKind> {
        if let Some(kind) = *self.change_email_error.lock().unwrap() {
            return Err(kind);
        }
        self.changed_emails
            .lock()
            .unwrap()
            .push(new_email.to_string());
        Ok(())
    }
}

// ─── Record store with failure injection ─────────────────────────

/// In-memory record store that can fail writes per collection and counts
/// every call.
#[derive(Default)]
pub struct FlakyRecordStore {
    inner: MemoryRecordStore,
    fail_set_collections: Mutex<HashSet<String>>,
    pub set_delay_ms: AtomicU64,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FlakyRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to `collection` fail.
    pub fn fail_sets_on(&self, collection: &str) {
        self.fail_set_collections
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_set_collections.lock().unwrap().clear();
    }

    pub async fn seed_user(&self, user: &User) {
        let doc = to_document(user);
        self.inner.set_all("users", &user.uid, doc).await.unwrap();
    }

    pub async fn seed_event(&self, event: &Event) {
        let doc = to_document(event);
        self.inner.set_all("events", &event.id, doc).await.unwrap();
    }

    pub async fn stored_user(&self, uid: &str) -> Option<User> {
        self.inner
            .get("users", uid)
            .await
            .unwrap()
            .map(from_document)
    }

    pub async fn stored_event(&self, id: &str) -> Option<Event> {
        self.inner
            .get("events", id)
            .await
            .unwrap()
            .map(from_document)
    }
}

fn to_document<T: serde::Serialize>(value: &T) -> Document {
    match serde_json::to_value(value).unwrap() {
        serde_json::Value::Object(map) => map,
        other => panic!("expected document, got {:?}", other),
    }
}

fn from_document<T: serde::de::DeserializeOwned>(doc: Document) -> T {
    serde_json::from_value(serde_json::Value::Object(doc)).unwrap()
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(collection, id).await
    }

    async fn set_all(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.set_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self
            .fail_set_collections
            .lock()
            .unwrap()
            .contains(collection)
        {
            return Err(AppError::Store(format!(
                "injected write failure on {}",
                collection
            )));
        }
        self.inner.set_all(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.inner.delete(collection, id).await
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_all(collection).await
    }
}

// ─── Blob store with call counting ───────────────────────────────

#[derive(Default)]
pub struct CountingBlobStore {
    inner: MemoryBlobStore,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_uploads: AtomicBool,
}

impl CountingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.inner.contains(locator)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Blob("injected upload failure".to_string()));
        }
        self.inner.upload(bytes).await
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(locator).await
    }
}

// ─── Geocoder stub ───────────────────────────────────────────────

#[derive(Default)]
pub struct StubGeocoder {
    pub placemarks: Mutex<Vec<Placemark>>,
}

impl StubGeocoder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn resolve(&self, _address: &str) -> Result<Vec<Placemark>> {
        Ok(self.placemarks.lock().unwrap().clone())
    }
}

// ─── Fetch transport stub ────────────────────────────────────────

/// Transport stub serving configured payloads, counting fetches per
/// locator, with optional latency and injectable failures.
#[derive(Default)]
pub struct CountingTransport {
    payloads: DashMap<String, Vec<u8>>,
    counts: DashMap<String, usize>,
    failing: DashMap<String, ()>,
    pub delay_ms: AtomicU64,
}

impl CountingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, locator: &str, payload: Vec<u8>) {
        self.payloads.insert(locator.to_string(), payload);
    }

    pub fn fail(&self, locator: &str) {
        self.failing.insert(locator.to_string(), ());
    }

    pub fn unfail(&self, locator: &str) {
        self.failing.remove(locator);
    }

    pub fn count(&self, locator: &str) -> usize {
        self.counts.get(locator).map(|c| *c).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }
}

#[async_trait]
impl FetchTransport for CountingTransport {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        *self.counts.entry(locator.to_string()).or_insert(0) += 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.contains_key(locator) {
            return Err(AppError::Fetch(format!("injected failure for {}", locator)));
        }
        self.payloads
            .get(locator)
            .map(|p| p.clone())
            .ok_or_else(|| AppError::Fetch(format!("no payload for {}", locator)))
    }
}

// ─── Harness ─────────────────────────────────────────────────────

/// Install a log subscriber so a failing test carries its traces.
/// First caller per test binary wins; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub session: Session,
    pub identity: Arc<StubIdentity>,
    pub records: Arc<FlakyRecordStore>,
    pub blobs: Arc<CountingBlobStore>,
    pub vault: Arc<MemoryVault>,
    pub geocoder: Arc<StubGeocoder>,
    pub transport: Arc<CountingTransport>,
}

/// Build a fully wired session over fresh fakes.
pub fn harness_with_identity(identity: StubIdentity) -> TestHarness {
    init_tracing();
    let identity = Arc::new(identity);
    let records = Arc::new(FlakyRecordStore::new());
    let blobs = Arc::new(CountingBlobStore::new());
    let vault = Arc::new(MemoryVault::new());
    let geocoder = Arc::new(StubGeocoder::new());
    let transport = Arc::new(CountingTransport::new());

    let session = Session::new(
        Config::test_default(),
        identity.clone(),
        vault.clone(),
        records.clone(),
        blobs.clone(),
        geocoder.clone(),
        transport.clone(),
    );

    TestHarness {
        session,
        identity,
        records,
        blobs,
        vault,
        geocoder,
        transport,
    }
}

pub fn harness() -> TestHarness {
    harness_with_identity(StubIdentity::new())
}

// ─── Sample data ─────────────────────────────────────────────────

pub fn sample_user(uid: &str) -> User {
    User::new(
        uid.to_string(),
        format!("{}@example.com", uid),
        format!("User {}", uid),
        Config::test_default().default_image_locator,
    )
}

pub fn sample_event(id: &str, creator_id: &str, date: NaiveDate) -> Event {
    Event {
        id: id.to_string(),
        title: format!("Event {}", id),
        description: "A sample event".to_string(),
        date,
        time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        image_locator: "blob://images/sample".to_string(),
        address: "1 Main St".to_string(),
        location: GeoPoint { lat: 0.0, lon: 0.0 },
        creator_id: creator_id.to_string(),
        participants: [creator_id.to_string()].into_iter().collect(),
    }
}

pub fn complete_draft() -> EventDraft {
    EventDraft {
        title: "Launch party".to_string(),
        description: "Come celebrate".to_string(),
        date: "09/14/2026".to_string(),
        time: "18:30".to_string(),
        address: "12 Rue de la Paix, Paris".to_string(),
        image: Some(vec![1, 2, 3, 4]),
        location: Some(GeoPoint {
            lat: 48.869,
            lon: 2.331,
        }),
    }
}
