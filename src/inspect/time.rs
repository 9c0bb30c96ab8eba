//! Decoder for the packed `time.Time` layout
//!
//! `wall` packs a has-monotonic flag (bit 63), a 33-bit second count since
//! 1885-01-01 and a 30-bit nanosecond field. When the flag is clear the
//! second count is zero and `ext` holds full seconds since year 1; when it is
//! set `ext` is a monotonic reading in nanoseconds.

use crate::remote::value::RawValue;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, Utc};

const HAS_MONOTONIC: u64 = 1 << 63;
const WALL_NSEC_SHIFT: u32 = 30;
/// Seconds between the unix epoch and 1885-01-01
const UNIX_TO_WALL_EPOCH: i64 = -2_682_288_000;
/// Largest whole number of seconds a nanosecond duration can hold
const MAX_ADD_SECONDS: i64 = i64::MAX / 1_000_000_000;

pub const TIME_TYPE: &str = "time.Time";

/// Human-readable form of a `time.Time` value, or its raw value when any
/// part of the layout is missing or out of range
pub fn format_time(v: &RawValue) -> String {
    decode(v).unwrap_or_else(|| v.value.clone())
}

fn decode(v: &RawValue) -> Option<String> {
    let wall = v.field("wall").filter(|f| f.is_readable())?;
    let ext = v.field("ext").filter(|f| f.is_readable())?;
    let wall: u64 = wall.value.parse().ok()?;
    let ext: i64 = ext.value.parse().ok()?;

    if wall & HAS_MONOTONIC != 0 {
        let sec = ((wall << 1) >> (WALL_NSEC_SHIFT + 1)) as i64;
        let t = DateTime::<Utc>::from_timestamp(sec + UNIX_TO_WALL_EPOCH, 0)?;
        Some(format!(
            "time.Time({}, {:+})",
            t.to_rfc3339_opts(SecondsFormat::Secs, true),
            ext
        ))
    } else {
        let mut t = NaiveDate::from_ymd_opt(1, 1, 1)?.and_hms_opt(0, 0, 0)?.and_utc();
        let mut rest = ext;
        while rest > MAX_ADD_SECONDS {
            t = t.checked_add_signed(TimeDelta::try_seconds(MAX_ADD_SECONDS)?)?;
            rest -= MAX_ADD_SECONDS;
        }
        t = t.checked_add_signed(TimeDelta::try_seconds(rest)?)?;
        Some(t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
