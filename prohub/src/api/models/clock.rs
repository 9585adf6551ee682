//! Wall-clock time handling for slots and reservations.
//!
//! Times are accepted as `HH:mm` or `HH:mm:ss` and always rendered as `HH:mm`.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serializer};

/// Parse `HH:mm` or `HH:mm:ss`, dropping any seconds
pub fn parse_clock_time(input: &str) -> Result<NaiveTime, String> {
    let input = input.trim();
    let parsed = NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S%.f"))
        .map_err(|_| format!("invalid time '{input}', expected HH:mm"))?;
    truncate_to_minute(parsed).ok_or_else(|| format!("invalid time '{input}'"))
}

pub fn truncate_to_minute(time: NaiveTime) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0)
}

pub fn format_clock_time(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// `#[serde(with = "clock::hh_mm")]` for `NaiveTime` fields
pub mod hh_mm {
    use super::*;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_clock_time(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_clock_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "clock::option_hh_mm")]` for `Option<NaiveTime>` fields
pub mod option_hh_mm {
    use super::*;

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.serialize_some(&format_clock_time(time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_clock_time(raw).map(Some).map_err(serde::de::Error::custom),
        }
    }
}
