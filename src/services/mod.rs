// SPDX-License-Identifier: MIT

//! Services module - the session core's components and collaborator
//! contracts.

pub mod auth;
pub mod geocode;
pub mod identity;
pub mod resource_cache;
pub mod subscriptions;

pub use auth::AuthSession;
pub use geocode::{Geocoder, Placemark};
pub use identity::{IdentityClient, IdentityErrorKind};
pub use resource_cache::{FetchTransport, HttpTransport, ResourceCache};
pub use subscriptions::{Repair, SubscriptionCoordinator};
