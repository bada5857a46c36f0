// SPDX-License-Identifier: MIT

//! Muster session core: authentication lifecycle, subscription
//! consistency, and remote-resource caching for the Muster events app.
//!
//! The presentation layer is a pure consumer: it watches the published
//! state (`AuthenticationState`, current user, derived event views, active
//! errors) and mutates nothing except by invoking the operations exposed
//! here. The identity provider, document store, blob store and geocoder
//! are external collaborators behind the traits in [`stores`] and
//! [`services`].

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod stores;

use config::Config;
use services::{
    AuthSession, FetchTransport, Geocoder, IdentityClient, ResourceCache, SubscriptionCoordinator,
};
use std::sync::Arc;
use stores::{BlobStore, CredentialVault, RecordDb, RecordStore};

/// A fully wired session: one per signed-in context.
///
/// Constructed explicitly from its collaborators rather than reaching for
/// ambient globals, so tests (and multi-account hosts) can run independent
/// sessions side by side.
pub struct Session {
    pub config: Config,
    pub auth: Arc<AuthSession>,
    pub coordinator: Arc<SubscriptionCoordinator>,
    pub images: ResourceCache,
}

impl Session {
    pub fn new(
        config: Config,
        identity: Arc<dyn IdentityClient>,
        vault: Arc<dyn CredentialVault>,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        geocoder: Arc<dyn Geocoder>,
        transport: Arc<dyn FetchTransport>,
    ) -> Self {
        let db = RecordDb::new(records);
        let coordinator = Arc::new(SubscriptionCoordinator::new(
            config.clone(),
            db,
            blobs,
            geocoder,
            identity.clone(),
            vault.clone(),
        ));
        let auth = Arc::new(AuthSession::new(
            config.clone(),
            identity,
            vault,
            coordinator.clone(),
        ));
        let images =
            ResourceCache::with_max_bytes(transport, config.resource_cache_max_bytes);

        Self {
            config,
            auth,
            coordinator,
            images,
        }
    }
}
