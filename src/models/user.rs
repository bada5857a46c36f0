//! User model and authentication lifecycle state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A user of the events app, as stored in the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Provider-issued unique identifier (also the document ID).
    /// Never empty once authenticated.
    pub uid: String,
    /// Email address
    pub email: String,
    /// Display name
    pub display_name: String,
    /// Profile image locator (defaults to the shared placeholder)
    pub image_locator: String,
    /// IDs of events this user created (order irrelevant)
    #[serde(default)]
    pub created_event_ids: HashSet<String>,
    /// IDs of events this user subscribed to (order irrelevant)
    #[serde(default)]
    pub subscribed_event_ids: HashSet<String>,
}

impl User {
    /// A fresh user record for a newly registered account.
    pub fn new(uid: String, email: String, display_name: String, image_locator: String) -> Self {
        Self {
            uid,
            email,
            display_name,
            image_locator,
            created_event_ids: HashSet::new(),
            subscribed_event_ids: HashSet::new(),
        }
    }
}

/// Authentication lifecycle state. Exactly one is active per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationState {
    SignedOut,
    SigningIn,
    SignedIn,
}
