// SPDX-License-Identifier: MIT

//! Identity provider contract and error classification.
//!
//! The concrete provider (hosted auth service) lives outside the core; the
//! core translates its failures into a closed set of kinds, each with a
//! fixed user-facing message.

use async_trait::async_trait;
use std::fmt;

/// Classified identity provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorKind {
    Network,
    NotFound,
    BadCredential,
    AlreadyExists,
    InvalidInput,
    RateLimited,
    Unknown,
}

impl IdentityErrorKind {
    /// One-to-one mapping from error kind to the string shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            IdentityErrorKind::Network => "Internet connection problem.",
            IdentityErrorKind::NotFound => "No account matches this email.",
            IdentityErrorKind::BadCredential => "Incorrect password.",
            IdentityErrorKind::AlreadyExists => "This email is already in use.",
            IdentityErrorKind::InvalidInput => "Invalid email format.",
            IdentityErrorKind::RateLimited => "Too many attempts. Please try again later.",
            IdentityErrorKind::Unknown => "An unknown error occurred.",
        }
    }
}

impl fmt::Display for IdentityErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

/// Thin call surface over the external identity provider.
///
/// Empty inputs are passed through; the provider is expected to reject
/// them with `InvalidInput`.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Create a new identity; returns the provider-issued UID.
    async fn register(&self, identity: &str, secret: &str) -> Result<String, IdentityErrorKind>;

    /// Prove an existing identity; returns the provider-issued UID.
    async fn authenticate(&self, identity: &str, secret: &str)
        -> Result<String, IdentityErrorKind>;

    /// End the provider-side session.
    async fn sign_out(&self) -> Result<(), IdentityErrorKind>;

    /// Change the account email. Requires a prior re-authentication.
    async fn change_email(&self, new_email: &str) -> Result<(), IdentityErrorKind>;
}
