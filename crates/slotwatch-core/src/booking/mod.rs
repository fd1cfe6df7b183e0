//! Booking domain model
//!
//! Courts, slot durations and the validated parameter set a session is
//! launched with. All opening-window arithmetic is done in minutes from
//! midnight to keep the checks integer-only.

mod url;

pub use url::build_target_url;

use crate::error::CollectError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// First bookable minute of the day (08:00).
pub const OPENING_MINUTE: u32 = 8 * 60;
/// Close of play (22:00). A slot must end at or before this minute.
pub const CLOSING_MINUTE: u32 = 22 * 60;
/// Bookings start on the hour or half hour only.
pub const GRID_MINUTES: u32 = 30;

/// One of the fixed set of bookable courts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Court {
    Court1,
    Court2,
    Court3,
    Court4,
}

impl Court {
    /// Court number as it appears on the booking site.
    pub fn number(&self) -> u8 {
        match self {
            Court::Court1 => 1,
            Court::Court2 => 2,
            Court::Court3 => 3,
            Court::Court4 => 4,
        }
    }

    /// Display name for prompts and summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            Court::Court1 => "Court 1",
            Court::Court2 => "Court 2",
            Court::Court3 => "Court 3",
            Court::Court4 => "Court 4",
        }
    }

    /// Parse a user selection ("2", "court 2", "Court 2").
    pub fn parse(input: &str) -> Result<Self, CollectError> {
        let normalized = input.trim().to_lowercase();
        let number = normalized.strip_prefix("court").map(str::trim).unwrap_or(&normalized);
        match number {
            "1" => Ok(Court::Court1),
            "2" => Ok(Court::Court2),
            "3" => Ok(Court::Court3),
            "4" => Ok(Court::Court4),
            _ => Err(CollectError::Validation(format!(
                "unknown court '{}', pick one of 1-4",
                input.trim()
            ))),
        }
    }
}

impl std::fmt::Display for Court {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One of the fixed set of bookable slot lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotDuration {
    Min60,
    Min90,
    Min120,
}

impl SlotDuration {
    pub fn minutes(&self) -> u32 {
        match self {
            SlotDuration::Min60 => 60,
            SlotDuration::Min90 => 90,
            SlotDuration::Min120 => 120,
        }
    }

    /// Parse a user selection ("90", "90 min", "90min").
    pub fn parse(input: &str) -> Result<Self, CollectError> {
        let normalized = input.trim().to_lowercase();
        let number = normalized
            .strip_suffix("minutes")
            .or_else(|| normalized.strip_suffix("min"))
            .map(str::trim)
            .unwrap_or(&normalized);
        match number {
            "60" => Ok(SlotDuration::Min60),
            "90" => Ok(SlotDuration::Min90),
            "120" => Ok(SlotDuration::Min120),
            _ => Err(CollectError::Validation(format!(
                "unknown duration '{}', pick 60, 90 or 120 minutes",
                input.trim()
            ))),
        }
    }
}

/// Validate that a start time is on the half-hour grid and inside the
/// opening window. The slot-fit check against the closing time happens once
/// the duration is known, see [`BookingParameters::validate_fit`].
pub fn validate_start_time(time: NaiveTime) -> Result<(), CollectError> {
    if time.second() != 0 || time.minute() % GRID_MINUTES != 0 {
        return Err(CollectError::Validation(
            "bookings start on the hour or half hour only".to_string(),
        ));
    }
    let minute = time.hour() * 60 + time.minute();
    if minute < OPENING_MINUTE || minute > CLOSING_MINUTE - GRID_MINUTES {
        return Err(CollectError::Validation(
            "start time is outside opening hours (08:00-22:00)".to_string(),
        ));
    }
    Ok(())
}

/// The validated parameter set collected from one user conversation.
///
/// Owned by the conversation until handed to the session launcher, which
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingParameters {
    pub court: Court,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration: SlotDuration,
}

impl BookingParameters {
    /// Check that the slot ends at or before closing time.
    pub fn validate_fit(
        start_time: NaiveTime,
        duration: SlotDuration,
    ) -> Result<(), CollectError> {
        let end_minute = start_time.hour() * 60 + start_time.minute() + duration.minutes();
        if end_minute > CLOSING_MINUTE {
            return Err(CollectError::Validation(format!(
                "a {} minute slot starting at {} runs past closing time (22:00)",
                duration.minutes(),
                start_time.format("%H:%M")
            )));
        }
        Ok(())
    }

    /// The wall-clock moment the booked slot would begin.
    pub fn target_datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Human-readable one-line summary, immutable for the session lifetime.
    pub fn display_info(&self) -> String {
        format!(
            "{} on {} at {} ({} min)",
            self.court.display_name(),
            self.date.format("%d/%m/%Y"),
            self.start_time.format("%H:%M"),
            self.duration.minutes()
        )
    }
}
