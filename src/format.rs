//! Text form of a port configuration.
//!
//! A configuration string looks like `/dev/ttyUSB0:9600,8N1,500ms`:
//!
//! ```text
//! <name> ":" <baud> [ "," <settings> [ "," <read timeout> ] ]
//! ```
//!
//! The name is everything before the last colon, so names may contain commas
//! and colons of their own. Settings use the conventional `<data><parity><stop>`
//! notation, optionally separated by `-` or `/` (`8N1`, `7-E-1`, `5/o/1.5`).
//! The timeout is a duration such as `500ms`, `1.5s` or `1m30s`.

use crate::port::{Parity, PortConfig, StopBits, DEFAULT_DATA_BITS};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from parsing configuration or settings strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("missing name or colon")]
    MissingColon,
    #[error("error parsing baud")]
    Baud,
    #[error("bad duration")]
    Duration,
    #[error("garbage after timeout")]
    TrailingFields,
    #[error("invalid data size")]
    DataSize,
    #[error("invalid input")]
    Truncated,
    #[error("mismatched separator")]
    MismatchedSeparator,
    #[error("invalid parity")]
    Parity,
    #[error("bad separator")]
    BadSeparator,
    #[error("invalid stop bits")]
    StopBits,
    #[error("garbage after input")]
    TrailingInput,
}

/// Parse `<name>:<baud>[,<settings>[,<timeout>]]`.
///
/// Omitted settings default to 8N1 and an omitted timeout to zero.
pub fn parse_config(s: &str) -> Result<PortConfig, FormatError> {
    let colon = s.rfind(':').ok_or(FormatError::MissingColon)?;
    let name = &s[..colon];
    let mut fields = s[colon + 1..].split(',');

    let baud = fields
        .next()
        .unwrap_or_default()
        .parse::<u32>()
        .map_err(|_| FormatError::Baud)?;
    let mut config = PortConfig::new(name, baud);

    let Some(settings) = fields.next() else {
        return Ok(config);
    };
    let (data_bits, parity, stop_bits) = parse_settings(settings)?;
    config.data_bits = data_bits;
    config.parity = parity;
    config.stop_bits = stop_bits;

    let Some(timeout) = fields.next() else {
        return Ok(config);
    };
    config.read_timeout = parse_duration(timeout)?;

    if fields.next().is_some() {
        return Err(FormatError::TrailingFields);
    }
    Ok(config)
}

impl FromStr for PortConfig {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_config(s)
    }
}

/// `name:baud,settings,timeout`, readable back by [`parse_config`].
///
/// The DTR flag has no text form and is not written.
impl fmt::Display for PortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{},{}",
            self.name,
            self.baud,
            format_settings(self.data_bits, self.parity, self.stop_bits),
            format_duration(self.read_timeout)
        )
    }
}

/// Format framing settings with no separators, e.g. `8N1` or `7E1.5`.
///
/// A data size of 0 is written as the default of 8.
pub fn format_settings(data_bits: u8, parity: Parity, stop_bits: StopBits) -> String {
    let size = match data_bits {
        0 => DEFAULT_DATA_BITS,
        n => n.min(9),
    };
    format!("{}{}{}", size, parity.letter(), stop_bits)
}

/// Parse `<data><parity><stop>`, with an optional `-` or `/` separator used
/// consistently between the fields. The empty string yields 8N1.
pub fn parse_settings(s: &str) -> Result<(u8, Parity, StopBits), FormatError> {
    if s.is_empty() {
        return Ok((DEFAULT_DATA_BITS, Parity::None, StopBits::One));
    }
    let bytes = s.as_bytes();
    let mut pos = 0;
    let next = |pos: &mut usize| -> Result<u8, FormatError> {
        let c = *bytes.get(*pos).ok_or(FormatError::Truncated)?;
        *pos += 1;
        Ok(c)
    };

    let size = match next(&mut pos)? {
        c @ b'1'..=b'8' => c - b'0',
        _ => return Err(FormatError::DataSize),
    };

    let mut c = next(&mut pos)?;
    let mut separator = None;
    if !c.is_ascii_alphanumeric() {
        if c != b'-' && c != b'/' {
            return Err(FormatError::MismatchedSeparator);
        }
        separator = Some(c);
        c = next(&mut pos)?;
    }
    let parity = Parity::from_letter(c as char).ok_or(FormatError::Parity)?;

    c = next(&mut pos)?;
    if let Some(sep) = separator {
        if c != sep || pos == bytes.len() {
            return Err(FormatError::BadSeparator);
        }
        c = next(&mut pos)?;
    }

    let rest = &bytes[pos..];
    let stop_bits = match c {
        b'1' if ends_number(rest) => StopBits::One,
        b'2' if ends_number(rest) => StopBits::Two,
        b'1' if rest.starts_with(b".5") && ends_number(&rest[2..]) => {
            pos += 2;
            StopBits::OneHalf
        }
        _ => return Err(FormatError::StopBits),
    };

    if pos != bytes.len() {
        return Err(FormatError::TrailingInput);
    }
    Ok((size, parity, stop_bits))
}

/// True when `rest` does not continue the number just read.
fn ends_number(rest: &[u8]) -> bool {
    match rest.first() {
        None => true,
        Some(&c) => c != b'.' && !c.is_ascii_digit(),
    }
}

/// Parse a duration like `300ms`, `1.5s`, `2h45m` or `0`.
///
/// Every number needs a unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`) except a
/// lone zero. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, FormatError> {
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(FormatError::Duration);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let int_len = rest
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let (int_part, tail) = rest.split_at(int_len);
        let (frac_part, tail) = match tail.strip_prefix('.') {
            Some(after) => {
                let frac_len = after.bytes().take_while(u8::is_ascii_digit).count();
                after.split_at(frac_len)
            }
            None => ("", tail),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(FormatError::Duration);
        }

        let unit_len = tail
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(FormatError::Duration),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| FormatError::Duration)?
        };
        let mut nanos = whole.checked_mul(scale).ok_or(FormatError::Duration)?;
        let mut place = scale;
        for digit in frac_part.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            nanos += u128::from(digit - b'0') * place;
        }

        total = total.checked_add(nanos).ok_or(FormatError::Duration)?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| FormatError::Duration)?;
    Ok(Duration::from_nanos(nanos))
}

/// Format a duration the way [`parse_duration`] reads it: `0s`, `1.5ms`,
/// `250ms`, `1m30s`, `1h0m0s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 6));
    }

    let secs = nanos / 1_000_000_000;
    let sub = nanos % 1_000_000_000;
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    let seconds = decimal(seconds * 1_000_000_000 + sub, 9);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `value / 10^places` with trailing fractional zeros dropped.
fn decimal(value: u128, places: u32) -> String {
    let unit = 10u128.pow(places);
    let (whole, frac) = (value / unit, value % unit);
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = places as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
