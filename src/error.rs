// SPDX-License-Identifier: MIT

//! Application error types with consistent user-facing classification.

use crate::services::identity::IdentityErrorKind;

/// Application error type shared by every core component.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", .0.describe())]
    Validation(DraftField),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{}", .0.user_message())]
    AuthProvider(IdentityErrorKind),

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("User not logged in")]
    NotSignedIn,

    /// One half of a paired write succeeded while the other failed.
    ///
    /// The two records now disagree; recovering requires a re-sync
    /// (see `SubscriptionCoordinator::reconcile`), not a plain retry.
    #[error("Partial update of event {event_id}: {detail}")]
    ConsistencyGap { event_id: String, detail: String },

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Geocoding error: {0}")]
    Geocode(String),

    #[error("Resource fetch error: {0}")]
    Fetch(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether this error is a consistency gap (used by callers to offer
    /// a re-sync action instead of a retry).
    pub fn is_consistency_gap(&self) -> bool {
        matches!(self, AppError::ConsistencyGap { .. })
    }
}

/// Event draft fields, in the order they are validated.
///
/// Validation is eager and fixed-order so the reported failure is always
/// the first violated precondition and error messages are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Description,
    Address,
    Image,
    Location,
    Date,
    Time,
}

impl DraftField {
    /// User-facing description of the violated precondition.
    pub fn describe(&self) -> &'static str {
        match self {
            DraftField::Title => "Title must not be empty",
            DraftField::Description => "Description must not be empty",
            DraftField::Address => "Address must not be empty",
            DraftField::Image => "An event image is required",
            DraftField::Location => "The address has not been resolved to a location",
            DraftField::Date => "Date must match MM/DD/YYYY",
            DraftField::Time => "Time must match HH:MM",
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, AppError>;
