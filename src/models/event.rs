// SPDX-License-Identifier: MIT

//! Event model and the pre-creation draft with its fixed-order validation.

use crate::error::{AppError, DraftField};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Date format the app's forms use.
pub const DATE_FORMAT: &str = "%m/%d/%Y";
/// Time format the app's forms use.
pub const TIME_FORMAT: &str = "%H:%M";

/// Geographic coordinates of an event venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// An event, as stored in the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unique identifier, assigned at creation (also the document ID).
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Locator of the event image blob.
    pub image_locator: String,
    pub address: String,
    pub location: GeoPoint,
    /// UID of the creating user. Immutable.
    pub creator_id: String,
    /// UIDs of subscribed users (order irrelevant). Always contains the
    /// creator.
    #[serde(default)]
    pub participants: HashSet<String>,
}

/// Form payload for a new event, before validation.
///
/// `date` and `time` stay as raw strings until validation parses them;
/// `location` is filled in by a geocoding step before submission.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub address: String,
    pub image: Option<Vec<u8>>,
    pub location: Option<GeoPoint>,
}

/// A draft that passed validation, with parsed date and time.
#[derive(Debug, Clone)]
pub struct ValidatedDraft {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub address: String,
    pub image: Vec<u8>,
    pub location: GeoPoint,
}

impl EventDraft {
    /// Check draft completeness eagerly, in a fixed order, so the reported
    /// failure is always the first violated precondition: title,
    /// description, address, image, location, date, time.
    ///
    /// Runs before any store or blob call is made.
    pub fn validate(&self) -> Result<ValidatedDraft, AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation(DraftField::Title));
        }
        if self.description.trim().is_empty() {
            return Err(AppError::Validation(DraftField::Description));
        }
        if self.address.trim().is_empty() {
            return Err(AppError::Validation(DraftField::Address));
        }
        let image = match &self.image {
            Some(bytes) if !bytes.is_empty() => bytes.clone(),
            _ => return Err(AppError::Validation(DraftField::Image)),
        };
        let location = self
            .location
            .ok_or(AppError::Validation(DraftField::Location))?;
        let date = NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT)
            .map_err(|_| AppError::Validation(DraftField::Date))?;
        let time = NaiveTime::parse_from_str(self.time.trim(), TIME_FORMAT)
            .map_err(|_| AppError::Validation(DraftField::Time))?;

        Ok(ValidatedDraft {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            date,
            time,
            address: self.address.trim().to_string(),
            image,
            location,
        })
    }
}
