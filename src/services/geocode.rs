// SPDX-License-Identifier: MIT

//! Geocoding collaborator contract.

use crate::error::Result;
use crate::models::GeoPoint;
use async_trait::async_trait;

/// A resolved place for an address query.
#[derive(Debug, Clone)]
pub struct Placemark {
    /// Normalized address text, when the service returns one.
    pub address: Option<String>,
    pub location: GeoPoint,
}

/// External geocoding service. The first returned placemark is used; an
/// empty result is a failure at the call site.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Vec<Placemark>>;
}
