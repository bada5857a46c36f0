// SPDX-License-Identifier: MIT

//! Data models for the session core.

pub mod event;
pub mod user;

pub use event::{Event, EventDraft, GeoPoint};
pub use user::{AuthenticationState, User};
