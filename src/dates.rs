//! `YYYY-MM-DD` serde format for calendar dates.
//!
//! Clients often send full timestamps for date fields (`1990-01-01T00:00:00Z`);
//! everything after the date part is ignored.

use serde::{Deserialize, Deserializer, Serializer};
use time::{format_description::FormatItem, macros::format_description, Date};

const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn parse(raw: &str) -> Result<Date, time::error::Parse> {
    let raw = raw.trim();
    let day = raw.split_once('T').map(|(d, _)| d).unwrap_or(raw);
    Date::parse(day, FORMAT)
}

pub fn format(date: &Date) -> String {
    date.format(FORMAT).unwrap_or_default()
}

pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format(date))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(date: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_some(&format(d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Date>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => {
                parse(&raw).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}
