//! Lifetime of lost discovered entities.
//!
//! Lifetimes are written the way the monitoring configuration writes time
//! periods: a plain number of seconds or a number with an `s`, `m`, `h`, `d`
//! or `w` suffix. `never` disables reaping.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// How long an entity that stopped being discovered is kept before it is
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLifetime", into = "String")]
pub enum Lifetime {
  /// Lost entities are kept forever.
  Never,
  /// Lost entities are deleted once unseen for longer than this many seconds.
  After(u64),
}

impl Default for Lifetime {
  fn default() -> Self { Self::After(30 * DAY) }
}

impl Lifetime {
  /// Whether an entity last seen at `last_seen` has outlived this lifetime at
  /// `now`. The comparison is strict, so a zero lifetime only expires
  /// entities unseen for a nonzero interval.
  pub fn expired(&self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match *self {
      Self::Never => false,
      Self::After(secs) => {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        let limit = Duration::try_seconds(secs).unwrap_or(Duration::MAX);
        now.signed_duration_since(last_seen) > limit
      }
    }
  }
}

/// Parse a time period such as `30`, `90s`, `15m`, `1h`, `7d` or `2w` into
/// seconds.
pub fn parse_seconds(input: &str) -> Result<u64> {
  let s = input.trim();
  let invalid = || Error::InvalidLifetime(input.to_owned());

  let (digits, unit) = match s.char_indices().last() {
    Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
    Some(_) => (s, 's'),
    None => return Err(invalid()),
  };

  if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
    return Err(invalid());
  }

  let multiplier = match unit {
    's' => 1,
    'm' => MINUTE,
    'h' => HOUR,
    'd' => DAY,
    'w' => WEEK,
    _ => return Err(invalid()),
  };

  digits
    .parse::<u64>()
    .ok()
    .and_then(|n| n.checked_mul(multiplier))
    .ok_or_else(invalid)
}

impl FromStr for Lifetime {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    if s.trim().eq_ignore_ascii_case("never") {
      return Ok(Self::Never);
    }
    parse_seconds(s).map(Self::After)
  }
}

impl fmt::Display for Lifetime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      Self::Never => f.write_str("never"),
      Self::After(0) => f.write_str("0"),
      Self::After(n) if n % WEEK == 0 => write!(f, "{}w", n / WEEK),
      Self::After(n) if n % DAY == 0 => write!(f, "{}d", n / DAY),
      Self::After(n) if n % HOUR == 0 => write!(f, "{}h", n / HOUR),
      Self::After(n) if n % MINUTE == 0 => write!(f, "{}m", n / MINUTE),
      Self::After(n) => write!(f, "{n}s"),
    }
  }
}

/// Wire form: either a bare number of seconds or a suffixed string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLifetime {
  Seconds(u64),
  Text(String),
}

impl TryFrom<RawLifetime> for Lifetime {
  type Error = Error;

  fn try_from(raw: RawLifetime) -> Result<Self> {
    match raw {
      RawLifetime::Seconds(n) => Ok(Self::After(n)),
      RawLifetime::Text(s) => s.parse(),
    }
  }
}

impl From<Lifetime> for String {
  fn from(l: Lifetime) -> Self { l.to_string() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_suffixes() {
    assert_eq!("0".parse::<Lifetime>().unwrap(), Lifetime::After(0));
    assert_eq!("90".parse::<Lifetime>().unwrap(), Lifetime::After(90));
    assert_eq!("15m".parse::<Lifetime>().unwrap(), Lifetime::After(900));
    assert_eq!("1h".parse::<Lifetime>().unwrap(), Lifetime::After(3600));
    assert_eq!("30d".parse::<Lifetime>().unwrap(), Lifetime::default());
    assert_eq!("2w".parse::<Lifetime>().unwrap(), Lifetime::After(2 * WEEK));
    assert_eq!("Never".parse::<Lifetime>().unwrap(), Lifetime::Never);
  }

  #[test]
  fn rejects_garbage() {
    for bad in ["", "h", "1y", "-5", "1.5h", "5 m"] {
      assert!(bad.parse::<Lifetime>().is_err(), "{bad:?} should not parse");
    }
  }

  #[test]
  fn display_uses_largest_exact_unit() {
    assert_eq!(Lifetime::After(0).to_string(), "0");
    assert_eq!(Lifetime::After(7 * DAY).to_string(), "1w");
    assert_eq!(Lifetime::After(3 * DAY).to_string(), "3d");
    assert_eq!(Lifetime::After(90).to_string(), "90s");
    assert_eq!(Lifetime::Never.to_string(), "never");
  }

  #[test]
  fn deserializes_numbers_and_strings() {
    let n: Lifetime = serde_json::from_str("0").unwrap();
    assert_eq!(n, Lifetime::After(0));
    let s: Lifetime = serde_json::from_str("\"1h\"").unwrap();
    assert_eq!(s, Lifetime::After(HOUR));
    assert_eq!(serde_json::to_string(&s).unwrap(), "\"1h\"");
  }

  #[test]
  fn zero_lifetime_expires_after_any_interval() {
    let seen = Utc::now();
    let zero = Lifetime::After(0);
    assert!(!zero.expired(seen, seen));
    assert!(zero.expired(seen, seen + Duration::seconds(1)));
    assert!(!Lifetime::Never.expired(seen, seen + Duration::days(10_000)));
  }
}
