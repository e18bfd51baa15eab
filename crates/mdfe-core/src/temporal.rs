//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines [`Timestamp`], a UTC-only timestamp truncated to seconds.
//!
//! ## Invariant
//!
//! Every timestamp that enters the canonical form must render
//! identically on every rebuild, so local offsets and sub-second
//! precision are rejected at construction. The rendered form is always
//! `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MdfeError;

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::now()`] — current UTC time, truncated.
/// - [`Timestamp::from_utc()`] — from a `DateTime<Utc>`, truncating sub-seconds.
/// - [`Timestamp::parse()`] — from an ISO 8601 string, rejecting non-UTC offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse from an RFC 3339 string.
    ///
    /// **Rejects non-UTC inputs.** Only the `Z` suffix is accepted —
    /// explicit offsets like `-03:00` are refused even when they denote
    /// the same instant, because they would render differently in the
    /// canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid RFC 3339 or does not
    /// end in `Z`.
    pub fn parse(s: &str) -> Result<Self, MdfeError> {
        if !s.ends_with('Z') {
            return Err(MdfeError::Serialization(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            MdfeError::Serialization(format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Render as `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Two-digit year component (e.g. 26 for 2026), as embedded in
    /// access keys.
    pub fn year_two_digit(&self) -> u8 {
        (self.0.year() % 100) as u8
    }

    /// Month component (1-12).
    pub fn month(&self) -> u8 {
        self.0.month() as u8
    }

    /// Access the inner UTC datetime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    // with_nanosecond(0) only fails for out-of-range values; 0 is in range.
    dt.with_nanosecond(0).unwrap_or(dt)
}
