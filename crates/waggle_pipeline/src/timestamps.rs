//! Video start-timestamp resolution.
//!
//! Structured names carry their interval directly: the stem is
//! `<camera>_<start>--<end>` (as produced by the segment finalizer) or a bare
//! timestamp, with tokens in either ISO-8601 or the recorder's compact
//! `YYYYMMDDTHHMMSS.ffffff[.nnn]Z` form. Device-local names instead end in a
//! naive `YYYY-mm-dd-HH-MM-SS` token, which is interpreted in the device
//! timezone and converted to UTC; that conversion is exact and deterministic
//! for a given input string.

use crate::error::{PipelineError, Result};
use crate::params::TimestampFormat;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::path::Path;

/// Timezone of device-local recording filenames.
pub const DEVICE_LOCAL_TZ: Tz = chrono_tz::Europe::Berlin;

/// Resolve the start instant of a video from its filename.
pub fn video_start_timestamp(video: &Path, format: TimestampFormat) -> Result<DateTime<Utc>> {
    let stem = video
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| malformed(video.display().to_string(), "no file stem"))?;

    match format {
        TimestampFormat::Structured => parse_structured_start(stem),
        TimestampFormat::DeviceLocal => parse_device_local_start(stem),
    }
}

/// Start timestamp from a structured stem: camera prefix (if any) is
/// stripped, then the token before `--` is parsed.
fn parse_structured_start(stem: &str) -> Result<DateTime<Utc>> {
    let rest = stem.split_once('_').map_or(stem, |(_, rest)| rest);
    let token = rest.split_once("--").map_or(rest, |(start, _)| start);
    parse_timestamp_token(token)
        .ok_or_else(|| malformed(token.to_string(), "not an ISO or compact timestamp"))
}

/// Start timestamp from a device-local stem: the trailing `_` token is a
/// naive local time, localized to the device timezone.
fn parse_device_local_start(stem: &str) -> Result<DateTime<Utc>> {
    let token = stem.rsplit('_').next().unwrap_or(stem);
    let naive = NaiveDateTime::parse_from_str(token, "%Y-%m-%d-%H-%M-%S")
        .map_err(|e| malformed(token.to_string(), &e.to_string()))?;

    DEVICE_LOCAL_TZ
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            malformed(
                token.to_string(),
                "local time is ambiguous or skipped in the device timezone",
            )
        })
}

/// Parse one timestamp token: RFC 3339 / ISO-8601 first, then the compact
/// recorder form `YYYYMMDDTHHMMSS.ffffff[.nnn]Z` (the trailing `.nnn` is a
/// clock-sync annotation and is ignored).
fn parse_timestamp_token(token: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(token) {
        return Some(parsed.with_timezone(&Utc));
    }

    let token = token.strip_suffix('Z')?;
    let mut parts = token.splitn(3, '.');
    let seconds_part = parts.next()?;
    let naive = NaiveDateTime::parse_from_str(seconds_part, "%Y%m%dT%H%M%S").ok()?;

    let micros = match parts.next() {
        Some(fraction) if !fraction.is_empty() => {
            let digits: String = fraction.chars().take(6).collect();
            if digits.chars().any(|c| !c.is_ascii_digit()) {
                return None;
            }
            let value: i64 = digits.parse().ok()?;
            value * 10i64.pow(6 - digits.len() as u32)
        }
        _ => 0,
    };

    let naive = naive + chrono::Duration::microseconds(micros);
    Some(Utc.from_utc_datetime(&naive))
}

fn malformed(input: String, reason: &str) -> PipelineError {
    PipelineError::Timestamp {
        input,
        reason: reason.to_string(),
    }
}
