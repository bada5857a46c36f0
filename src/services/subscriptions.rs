// SPDX-License-Identifier: MIT

//! Session coordinator: authoritative owner of the signed-in user and the
//! derived event views, and of the paired writes that keep
//! `User.subscribed_event_ids`/`created_event_ids` and
//! `Event.participants` consistent.
//!
//! The two records live in independent documents and the store has no
//! cross-document transaction, so a paired write can partially fail. A
//! partial failure is surfaced as `AppError::ConsistencyGap` and the
//! missing half is queued for an explicit `reconcile` pass; the core never
//! retries on its own.

use crate::config::Config;
use crate::error::{AppError, DraftField, Result};
use crate::models::{Event, EventDraft, GeoPoint, User};
use crate::services::auth::reauthenticate_with;
use crate::services::geocode::Geocoder;
use crate::services::identity::IdentityClient;
use crate::stores::{BlobStore, CredentialVault, RecordDb};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

/// Atomic view of the session: the user and the full event set move
/// together, so readers always observe a pre- or post-mutation snapshot.
#[derive(Default)]
struct SessionSnapshot {
    user: Option<User>,
    events: Vec<Event>,
}

/// The missing half of a partially applied paired write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// The user record was written but the event's participant set was not.
    EventParticipants {
        event_id: String,
        uid: String,
        add: bool,
    },
    /// The event record was written but the user record was not.
    UserRecord { uid: String },
}

/// Coordinates the session user, the derived event views and all paired
/// writes against the record store.
pub struct SubscriptionCoordinator {
    config: Config,
    db: RecordDb,
    blobs: Arc<dyn BlobStore>,
    geocoder: Arc<dyn Geocoder>,
    identity: Arc<dyn IdentityClient>,
    vault: Arc<dyn CredentialVault>,
    // Guards are never held across an await; mutations clone out, write
    // remotely, then commit back.
    snapshot: RwLock<SessionSnapshot>,
    /// Single-writer discipline: one mutation in flight per session.
    write_lock: Mutex<()>,
    /// Missing paired-write halves awaiting `reconcile`.
    repairs: StdMutex<Vec<Repair>>,
    user_tx: watch::Sender<Option<User>>,
    error_tx: watch::Sender<Option<String>>,
}

impl SubscriptionCoordinator {
    pub fn new(
        config: Config,
        db: RecordDb,
        blobs: Arc<dyn BlobStore>,
        geocoder: Arc<dyn Geocoder>,
        identity: Arc<dyn IdentityClient>,
        vault: Arc<dyn CredentialVault>,
    ) -> Self {
        let (user_tx, _) = watch::channel(None);
        let (error_tx, _) = watch::channel(None);
        Self {
            config,
            db,
            blobs,
            geocoder,
            identity,
            vault,
            snapshot: RwLock::new(SessionSnapshot::default()),
            write_lock: Mutex::new(()),
            repairs: StdMutex::new(Vec::new()),
            user_tx,
            error_tx,
        }
    }

    // ─── Published State ─────────────────────────────────────────

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<User> {
        self.snapshot.read().unwrap().user.clone()
    }

    /// Watch the signed-in user across sign-in/sign-out and profile edits.
    pub fn subscribe_user(&self) -> watch::Receiver<Option<User>> {
        self.user_tx.subscribe()
    }

    /// The active error for display, set by the most recent failed
    /// operation and cleared when a new one starts.
    pub fn last_error(&self) -> Option<String> {
        self.error_tx.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    /// The full event set, in store order.
    pub fn all_events(&self) -> Vec<Event> {
        self.snapshot.read().unwrap().events.clone()
    }

    /// Events created by the session user, sorted by date descending.
    /// Equal dates keep store order.
    pub fn created_events(&self) -> Vec<Event> {
        let snapshot = self.snapshot.read().unwrap();
        let Some(user) = &snapshot.user else {
            return Vec::new();
        };
        Self::sorted_desc(
            snapshot
                .events
                .iter()
                .filter(|e| e.creator_id == user.uid)
                .cloned()
                .collect(),
        )
    }

    /// Events the session user participates in, sorted by date descending.
    /// Membership comes from the event records (participants), not from
    /// the denormalized user sets, so a pending repair never hides the
    /// authoritative side.
    pub fn subscribed_events(&self) -> Vec<Event> {
        let snapshot = self.snapshot.read().unwrap();
        let Some(user) = &snapshot.user else {
            return Vec::new();
        };
        Self::sorted_desc(
            snapshot
                .events
                .iter()
                .filter(|e| e.participants.contains(&user.uid))
                .cloned()
                .collect(),
        )
    }

    /// Whether the session user is subscribed to the given event.
    pub fn is_subscribed(&self, event_id: &str) -> bool {
        self.snapshot
            .read()
            .unwrap()
            .user
            .as_ref()
            .map(|u| u.subscribed_event_ids.contains(event_id))
            .unwrap_or(false)
    }

    /// Paired-write halves still waiting for a `reconcile` pass.
    pub fn pending_repairs(&self) -> Vec<Repair> {
        self.repairs.lock().unwrap().clone()
    }

    fn sorted_desc(mut events: Vec<Event>) -> Vec<Event> {
        // Stable sort: ties on date retain store-returned order.
        events.sort_by(|a, b| b.date.cmp(&a.date));
        events
    }

    fn set_error(&self, action: &str) {
        self.error_tx.send_replace(Some(action.to_string()));
    }

    fn clear_error(&self) {
        self.error_tx.send_replace(None);
    }

    fn commit_user(&self, user: User) {
        self.snapshot.write().unwrap().user = Some(user.clone());
        self.user_tx.send_replace(Some(user));
    }

    fn commit_events(&self, events: Vec<Event>) {
        self.snapshot.write().unwrap().events = events;
    }

    fn require_user(&self) -> Result<User> {
        self.current_user().ok_or_else(|| {
            self.set_error("User not logged in");
            AppError::NotSignedIn
        })
    }

    fn queue_repair(&self, repair: Repair) {
        tracing::warn!(?repair, "Paired write left a consistency gap, queueing repair");
        self.repairs.lock().unwrap().push(repair);
    }

    // ─── Session Loading ─────────────────────────────────────────

    /// Load the session user and the full event set.
    ///
    /// Fails with `NotFound` when no record exists for `uid`; a session is
    /// never created implicitly. The event list is a full scan: the store
    /// has no membership index, so created/subscribed views are derived
    /// locally.
    pub async fn load_user(&self, uid: &str) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        self.clear_error();

        let user = match self.db.get_user(uid).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.set_error("User not found");
                return Err(AppError::NotFound(format!("user {}", uid)));
            }
            Err(e) => {
                self.set_error("loading the user session");
                return Err(e);
            }
        };

        let events = match self.db.list_events().await {
            Ok(events) => events,
            Err(e) => {
                self.set_error("fetching events");
                return Err(e);
            }
        };

        tracing::info!(uid, events = events.len(), "Session loaded");
        self.commit_events(events);
        self.commit_user(user.clone());
        Ok(user)
    }

    /// Re-read the full event set from the store.
    pub async fn refresh_events(&self) -> Result<()> {
        match self.db.list_events().await {
            Ok(events) => {
                self.commit_events(events);
                Ok(())
            }
            Err(e) => {
                self.set_error("fetching events");
                Err(e)
            }
        }
    }

    /// Write a fresh user record during registration. No session state is
    /// touched; the caller loads the session afterwards.
    pub(crate) async fn create_user_record(&self, user: &User) -> Result<()> {
        self.db.set_user(user).await
    }

    // ─── Event Creation ──────────────────────────────────────────

    /// Resolve an address to coordinates for a draft. The first placemark
    /// wins; an empty result is a failure.
    pub async fn resolve_address(&self, address: &str) -> Result<GeoPoint> {
        self.clear_error();
        let placemarks = match self.geocoder.resolve(address).await {
            Ok(p) => p,
            Err(e) => {
                self.set_error("resolving the address");
                return Err(e);
            }
        };
        match placemarks.first() {
            Some(mark) => Ok(mark.location),
            None => {
                self.set_error("resolving the address");
                Err(AppError::Geocode(format!("No results for {:?}", address)))
            }
        }
    }

    /// Validate and persist a new event.
    ///
    /// Validation runs first and never reaches the network. After it
    /// passes: image upload, event record write (the creator is a
    /// participant of their own event), then the user-record half of the
    /// paired write. A record-write failure after the upload deletes the
    /// now-orphaned blob.
    pub async fn create_event(&self, draft: &EventDraft, creator_id: &str) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        self.clear_error();

        let mut user = self.require_user()?;
        if user.uid != creator_id {
            self.set_error("creating the event");
            return Err(AppError::NotSignedIn);
        }

        let validated = match draft.validate() {
            Ok(v) => v,
            Err(e) => {
                self.error_tx.send_replace(Some(e.to_string()));
                return Err(e);
            }
        };

        let image_locator = match self.blobs.upload(validated.image).await {
            Ok(locator) => locator,
            Err(e) => {
                self.set_error("creating the event");
                return Err(e);
            }
        };

        let event = Event {
            id: Uuid::new_v4().to_string(),
            title: validated.title,
            description: validated.description,
            date: validated.date,
            time: validated.time,
            image_locator: image_locator.clone(),
            address: validated.address,
            location: validated.location,
            creator_id: user.uid.clone(),
            participants: std::iter::once(user.uid.clone()).collect(),
        };

        if let Err(e) = self.db.set_event(&event).await {
            // The uploaded image has no record referencing it; remove it
            // rather than leaving an orphaned blob.
            if let Err(del) = self.blobs.delete(&image_locator).await {
                tracing::warn!(locator = %image_locator, error = %del, "Orphaned blob cleanup failed");
            }
            self.set_error("creating the event");
            return Err(e);
        }

        user.created_event_ids.insert(event.id.clone());
        if let Err(e) = self.db.set_user(&user).await {
            self.queue_repair(Repair::UserRecord {
                uid: user.uid.clone(),
            });
            self.commit_user(user);
            self.set_error("creating the event");
            return Err(AppError::ConsistencyGap {
                event_id: event.id,
                detail: format!("user record write failed after event record write: {}", e),
            });
        }
        self.commit_user(user);

        self.refresh_events().await?;
        tracing::info!(event_id = %event.id, "Event created");
        Ok(event.id)
    }

    // ─── Subscribe / Unsubscribe ─────────────────────────────────

    /// Subscribe the session user to an event.
    ///
    /// Paired write: user record first, event participants second. If the
    /// second write fails the user side stays committed and the gap is
    /// surfaced; `reconcile` retries the missing half.
    pub async fn subscribe(&self, event_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.clear_error();

        let mut user = self.require_user()?;
        if user.subscribed_event_ids.contains(event_id) {
            return Ok(());
        }

        let mut event = match self.db.get_event(event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.set_error("subscribing to the event");
                return Err(AppError::NotFound(format!("event {}", event_id)));
            }
            Err(e) => {
                self.set_error("subscribing to the event");
                return Err(e);
            }
        };

        user.subscribed_event_ids.insert(event_id.to_string());
        if let Err(e) = self.db.set_user(&user).await {
            // First write failed: nothing was applied, plain error.
            self.set_error("subscribing to the event");
            return Err(e);
        }
        self.commit_user(user.clone());

        event.participants.insert(user.uid.clone());
        if let Err(e) = self.db.set_event(&event).await {
            self.queue_repair(Repair::EventParticipants {
                event_id: event_id.to_string(),
                uid: user.uid.clone(),
                add: true,
            });
            self.set_error("subscribing to the event");
            return Err(AppError::ConsistencyGap {
                event_id: event_id.to_string(),
                detail: format!("participant write failed after user record write: {}", e),
            });
        }

        self.refresh_events().await?;
        tracing::info!(event_id, "Subscribed to event");
        Ok(())
    }

    /// Unsubscribe the session user from an event. A no-op success when
    /// the event is not in the user's subscribed set.
    pub async fn unsubscribe(&self, event_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.clear_error();

        let mut user = self.require_user()?;
        if !user.subscribed_event_ids.contains(event_id) {
            return Ok(());
        }

        let event = match self.db.get_event(event_id).await {
            Ok(event) => event,
            Err(e) => {
                self.set_error("unsubscribing from the event");
                return Err(e);
            }
        };

        user.subscribed_event_ids.remove(event_id);
        if let Err(e) = self.db.set_user(&user).await {
            self.set_error("unsubscribing from the event");
            return Err(e);
        }
        self.commit_user(user.clone());

        // The event may have been deleted remotely; the user side is then
        // already consistent.
        if let Some(mut event) = event {
            event.participants.remove(&user.uid);
            if let Err(e) = self.db.set_event(&event).await {
                self.queue_repair(Repair::EventParticipants {
                    event_id: event_id.to_string(),
                    uid: user.uid.clone(),
                    add: false,
                });
                self.set_error("unsubscribing from the event");
                return Err(AppError::ConsistencyGap {
                    event_id: event_id.to_string(),
                    detail: format!("participant write failed after user record write: {}", e),
                });
            }
        }

        self.refresh_events().await?;
        Ok(())
    }

    // ─── Profile ─────────────────────────────────────────────────

    /// Update email and display name.
    ///
    /// Re-authenticates with the vault credentials before the provider's
    /// email change, which the provider requires to be recent. The
    /// provider call and the record write are independent: a provider
    /// failure leaves the record untouched; a record failure leaves the
    /// stored profile stale relative to the provider identity.
    pub async fn update_profile(&self, email: &str, display_name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.clear_error();

        let mut user = self.require_user()?;

        if let Err(e) = reauthenticate_with(&*self.identity, &*self.vault).await {
            self.set_error("updating profile");
            return Err(e);
        }

        if email != user.email {
            if let Err(kind) = self.identity.change_email(email).await {
                self.set_error("updating profile");
                return Err(AppError::AuthProvider(kind));
            }
        }

        user.email = email.to_string();
        user.display_name = display_name.to_string();
        if let Err(e) = self.db.set_user(&user).await {
            // Provider already holds the new email; the stored profile is
            // stale until the caller retries.
            self.set_error("updating profile");
            return Err(e);
        }
        self.commit_user(user);
        Ok(())
    }

    /// Upload a new profile image and persist its locator.
    ///
    /// The previous blob is deleted afterwards unless it is the shared
    /// default placeholder.
    pub async fn upload_profile_image(&self, payload: Vec<u8>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.clear_error();

        let mut user = self.require_user()?;
        if payload.is_empty() {
            self.error_tx
                .send_replace(Some(DraftField::Image.describe().to_string()));
            return Err(AppError::Validation(DraftField::Image));
        }

        let previous = user.image_locator.clone();
        let locator = match self.blobs.upload(payload).await {
            Ok(locator) => locator,
            Err(e) => {
                self.set_error("uploading new profile picture");
                return Err(e);
            }
        };

        user.image_locator = locator.clone();
        if let Err(e) = self.db.set_user(&user).await {
            if let Err(del) = self.blobs.delete(&locator).await {
                tracing::warn!(locator = %locator, error = %del, "Orphaned blob cleanup failed");
            }
            self.set_error("uploading new profile picture");
            return Err(e);
        }
        self.commit_user(user);

        if previous != self.config.default_image_locator {
            // Best-effort: a dangling old blob is preferable to a failed
            // profile update.
            if let Err(e) = self.blobs.delete(&previous).await {
                tracing::warn!(locator = %previous, error = %e, "Previous profile image not deleted");
            }
        }
        Ok(())
    }

    // ─── Reconciliation ──────────────────────────────────────────

    /// Retry the missing halves of partially applied paired writes.
    ///
    /// Explicit and caller-driven; returns the number of repairs still
    /// pending (0 when the stores are consistent again).
    pub async fn reconcile(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let pending: Vec<Repair> = self.repairs.lock().unwrap().drain(..).collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut still_pending = Vec::new();
        for repair in pending {
            if let Err(e) = self.apply_repair(&repair).await {
                tracing::warn!(?repair, error = %e, "Repair failed, keeping it queued");
                still_pending.push(repair);
            }
        }

        let remaining = still_pending.len();
        self.repairs.lock().unwrap().extend(still_pending);

        if remaining == 0 {
            self.refresh_events().await?;
            tracing::info!("All consistency repairs applied");
        }
        Ok(remaining)
    }

    async fn apply_repair(&self, repair: &Repair) -> Result<()> {
        match repair {
            Repair::EventParticipants { event_id, uid, add } => {
                let Some(mut event) = self.db.get_event(event_id).await? else {
                    // Event gone; nothing left to repair.
                    return Ok(());
                };
                if *add {
                    event.participants.insert(uid.clone());
                } else {
                    event.participants.remove(uid);
                }
                self.db.set_event(&event).await
            }
            Repair::UserRecord { uid } => {
                let user = self.snapshot.read().unwrap().user.clone();
                match user {
                    Some(user) if user.uid == *uid => self.db.set_user(&user).await,
                    // The session moved on; the divergent record can only
                    // be repaired by that user's next session.
                    _ => Ok(()),
                }
            }
        }
    }

    // ─── Session Teardown ────────────────────────────────────────

    /// Clear the in-memory session. No remote effect.
    pub fn logout(&self) {
        {
            let mut snapshot = self.snapshot.write().unwrap();
            snapshot.user = None;
            snapshot.events.clear();
        }
        self.repairs.lock().unwrap().clear();
        self.user_tx.send_replace(None);
        self.clear_error();
    }
}
