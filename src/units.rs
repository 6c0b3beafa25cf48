// SPDX-License-Identifier: MIT
//! Human-readable duration and size parsing.
//!
//! Configuration values such as export timeouts and record size caps are
//! written by people, so they arrive as strings like `"1h30m"` or `"16KB"`.
//! This module turns them into canonical integers:
//!
//! * [`parse_duration`] – whole seconds from `<digits><unit>` components,
//!   units `s`, `m`, `h`, `d`. Components are summed, so `"1h30m"` is `5400`.
//! * [`parse_size`] – whole bytes from `<number>[unit]`, units `B`, `K`/`KB`,
//!   `M`/`MB`, `G`/`GB`, `T`/`TB`. Multipliers are binary (1 KB = 1024 B).
//!
//! A string made only of ASCII digits is taken as-is by both parsers.
//!
//! Successful results are memoized per input string in a small LRU cache that
//! is safe to share across threads. Failures are never cached.
//!
//! # Example
//! ```
//! use logship::units::{parse_duration, parse_size};
//! assert_eq!(parse_duration("1h30m").unwrap(), 5400);
//! assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
//! ```
use std::num::NonZeroUsize;

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::{Rule, ValidationError};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

// ASCII classes on purpose: `\d` would also accept non-ASCII digits.
static DURATION_COMPONENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+)([dhms])").expect("duration pattern is valid"));
static SIZE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*(KB|K|MB|M|GB|G|TB|T|B)?$")
        .expect("size pattern is valid")
});

type Memo = Mutex<LruCache<String, u64>>;

static DURATION_CACHE: Lazy<Memo> = Lazy::new(|| Mutex::new(LruCache::new(CACHE_CAPACITY)));
static SIZE_CACHE: Lazy<Memo> = Lazy::new(|| Mutex::new(LruCache::new(CACHE_CAPACITY)));

/// Parse a duration string into whole seconds.
///
/// Bare digit strings are seconds. Anything else is lower-cased and scanned
/// for `<digits><unit>` components which are summed; text between components
/// is skipped and repeated units add up (`"30s30s"` is `60`). Whitespace is
/// not trimmed.
///
/// # Errors
/// * [`Rule::Duration`] – no component was found (e.g. `"abc"`, `""`) or the
///   total does not fit in a `u64`.
/// * [`Rule::DurationUnit`] – a matched unit has no table entry.
pub fn parse_duration(value: &str) -> Result<u64, ValidationError> {
    memoized(&DURATION_CACHE, value, duration_seconds)
}

/// Parse a size string into whole bytes.
///
/// Bare digit strings are bytes. Anything else is upper-cased and must be a
/// number (optionally with a fractional part) followed by an optional unit,
/// covering the whole string. Fractional bytes are truncated.
///
/// # Errors
/// * [`Rule::Size`] – the string does not have that shape (e.g. `"MB"`,
///   `"-1K"`) or the result does not fit in a `u64`.
/// * [`Rule::SizeUnit`] – a matched unit has no table entry.
pub fn parse_size(value: &str) -> Result<u64, ValidationError> {
    memoized(&SIZE_CACHE, value, size_bytes)
}

fn memoized(
    cache: &Memo,
    value: &str,
    parse: fn(&str) -> Result<u64, ValidationError>,
) -> Result<u64, ValidationError> {
    let cached = cache.lock().get(value).copied();
    if let Some(hit) = cached {
        return Ok(hit);
    }
    let parsed = parse(value)?;
    cache.lock().put(value.to_string(), parsed);
    Ok(parsed)
}

fn is_bare_integer(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn duration_unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "s" => Some(1),
        "m" => Some(SECONDS_PER_MINUTE),
        "h" => Some(SECONDS_PER_HOUR),
        "d" => Some(SECONDS_PER_DAY),
        _ => None,
    }
}

fn size_unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "" | "B" => Some(1),
        "K" | "KB" => Some(KIB),
        "M" | "MB" => Some(MIB),
        "G" | "GB" => Some(GIB),
        "T" | "TB" => Some(TIB),
        _ => None,
    }
}

fn duration_seconds(value: &str) -> Result<u64, ValidationError> {
    let invalid = |rule| ValidationError::new(value, rule);

    if is_bare_integer(value) {
        return value.parse().map_err(|_| invalid(Rule::Duration));
    }

    let folded = value.to_lowercase();
    let mut total: u64 = 0;
    let mut matched = false;
    for component in DURATION_COMPONENT.captures_iter(&folded) {
        matched = true;
        let per_unit =
            duration_unit_seconds(&component[2]).ok_or_else(|| invalid(Rule::DurationUnit))?;
        let amount: u64 = component[1].parse().map_err(|_| invalid(Rule::Duration))?;
        total = amount
            .checked_mul(per_unit)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(|| invalid(Rule::Duration))?;
    }

    if matched {
        Ok(total)
    } else {
        Err(invalid(Rule::Duration))
    }
}

fn size_bytes(value: &str) -> Result<u64, ValidationError> {
    let invalid = |rule| ValidationError::new(value, rule);

    if is_bare_integer(value) {
        return value.parse().map_err(|_| invalid(Rule::Size));
    }

    let folded = value.to_uppercase();
    let shape = SIZE_SHAPE
        .captures(&folded)
        .ok_or_else(|| invalid(Rule::Size))?;
    let unit = shape.get(2).map_or("", |m| m.as_str());
    let multiplier = size_unit_multiplier(unit).ok_or_else(|| invalid(Rule::SizeUnit))?;
    let amount: f64 = shape[1].parse().map_err(|_| invalid(Rule::Size))?;

    let bytes = amount * multiplier as f64;
    // u64::MAX rounds up to 2^64 as f64, so `>=` rejects anything that would saturate.
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(invalid(Rule::Size));
    }
    Ok(bytes as u64)
}
