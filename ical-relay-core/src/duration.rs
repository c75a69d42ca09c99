//! Go-style duration strings (`1h30m`, `-15m`, `1.5h`, `300ms`).

use std::sync::LazyLock;

use chrono::TimeDelta;
use regex::Regex;

/// One `<number><unit>` group. Units are tried longest first so `ms` wins over `m`.
static GROUP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]*)(?:\.([0-9]*))?(ns|us|µs|μs|ms|s|m|h)")
        .expect("GROUP_REGEX pattern is valid")
});

fn unit_nanos(unit: &str) -> i128 {
    match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        _ => 3_600 * 1_000_000_000,
    }
}

/// Parse a duration with Go's `time.ParseDuration` grammar.
///
/// An optional sign is followed by one or more decimal numbers, each with an
/// optional fraction and a unit (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`).
/// `"0"` is the zero duration. Anything else is rejected.
pub fn parse_duration(input: &str) -> Result<TimeDelta, String> {
    let invalid = || format!("invalid duration '{input}'");

    let (negative, unsigned) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if unsigned == "0" {
        return Ok(TimeDelta::zero());
    }
    if unsigned.is_empty() {
        return Err(invalid());
    }

    let mut total: i128 = 0;
    let mut position = 0;
    for group in GROUP_REGEX.captures_iter(unsigned) {
        let (Some(whole), Some(unit)) = (group.get(0), group.get(3)) else {
            return Err(invalid());
        };
        if whole.start() != position {
            return Err(invalid());
        }
        position = whole.end();

        let integer = group.get(1).map_or("", |m| m.as_str());
        let fraction = group.get(2).map_or("", |m| m.as_str());
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let scale = unit_nanos(unit.as_str());
        let integer: i128 = if integer.is_empty() {
            0
        } else {
            integer.parse().map_err(|_| invalid())?
        };
        total += integer.checked_mul(scale).ok_or_else(invalid)?;
        total += fraction_nanos(fraction, scale);

        if total > i64::MAX as i128 {
            return Err(format!("duration '{input}' is out of range"));
        }
    }
    if position != unsigned.len() {
        return Err(invalid());
    }

    let nanos = total as i64;
    Ok(TimeDelta::nanoseconds(if negative { -nanos } else { nanos }))
}

/// Nanoseconds contributed by the digits after the decimal point, truncated.
fn fraction_nanos(digits: &str, scale: i128) -> i128 {
    let mut nanos = 0;
    let mut divisor = 1;
    for digit in digits.bytes().take(18) {
        divisor *= 10;
        nanos += i128::from(digit - b'0') * scale / divisor;
    }
    nanos
}
