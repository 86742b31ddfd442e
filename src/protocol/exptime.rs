//! Expiration time resolution.
//!
//! memcached overloads the `exptime` field of storage commands:
//!
//! | value                  | meaning                                   |
//! |------------------------|-------------------------------------------|
//! | `0`                    | never expires                             |
//! | `1 ..= 2592000`        | relative, in seconds (up to 30 days)      |
//! | `> 2592000`            | absolute Unix timestamp                   |
//! | negative               | already expired                           |

use crate::protocol::command::{parse_decimal, ParseError};
use crate::storage::Expiration;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Largest `exptime` still read as a relative number of seconds (30 days).
pub const MAX_RELATIVE_EXPTIME: i64 = 30 * 24 * 3600;

/// Resolves an `exptime` token against the current wall clock.
pub fn resolve_exptime(token: &[u8]) -> Result<Expiration, ParseError> {
    resolve_exptime_at(token, SystemTime::now())
}

/// Resolves an `exptime` token as if the current time were `now`.
pub fn resolve_exptime_at(token: &[u8], now: SystemTime) -> Result<Expiration, ParseError> {
    let t = parse_decimal(token).ok_or(ParseError::InvalidExptime)?;

    let expiration = match t {
        0 => Expiration::Never,
        t if t > MAX_RELATIVE_EXPTIME => {
            // Beyond what SystemTime can represent is as good as never.
            let Some(deadline) = UNIX_EPOCH.checked_add(Duration::from_secs(t as u64)) else {
                return Ok(Expiration::Never);
            };
            match deadline.duration_since(now) {
                Ok(remaining) if !remaining.is_zero() => Expiration::After(remaining),
                _ => Expiration::Expired,
            }
        }
        t if t < 0 => Expiration::Expired,
        t => Expiration::After(Duration::from_secs(t as u64)),
    };

    Ok(expiration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_zero_never_expires() {
        assert_eq!(resolve_exptime_at(b"0", at(NOW)), Ok(Expiration::Never));
    }

    #[test]
    fn test_relative_seconds() {
        assert_eq!(
            resolve_exptime_at(b"10", at(NOW)),
            Ok(Expiration::After(Duration::from_secs(10)))
        );
        assert_eq!(
            resolve_exptime_at(b"2592000", at(NOW)),
            Ok(Expiration::After(Duration::from_secs(2_592_000)))
        );
    }

    #[test]
    fn test_absolute_timestamp() {
        let deadline = (NOW + 300).to_string();
        assert_eq!(
            resolve_exptime_at(deadline.as_bytes(), at(NOW)),
            Ok(Expiration::After(Duration::from_secs(300)))
        );
    }

    #[test]
    fn test_absolute_timestamp_in_past() {
        // 30 days + 1s is read as a timestamp in January 1970.
        assert_eq!(
            resolve_exptime_at(b"2592001", at(NOW)),
            Ok(Expiration::Expired)
        );

        let now = NOW.to_string();
        assert_eq!(
            resolve_exptime_at(now.as_bytes(), at(NOW)),
            Ok(Expiration::Expired)
        );
    }

    #[test]
    fn test_negative_is_expired() {
        assert_eq!(resolve_exptime_at(b"-5", at(NOW)), Ok(Expiration::Expired));
        assert_eq!(
            resolve_exptime_at(b"-999999999", at(NOW)),
            Ok(Expiration::Expired)
        );
    }

    #[test]
    fn test_invalid_tokens() {
        for token in [&b""[..], b"abc", b"10s", b"1e3", b" 10", b"9999999999999999999999"] {
            assert_eq!(
                resolve_exptime_at(token, at(NOW)),
                Err(ParseError::InvalidExptime),
                "token {:?}",
                String::from_utf8_lossy(token)
            );
        }
    }

    #[test]
    fn test_huge_timestamp_never_expires() {
        let huge = i64::MAX.to_string();
        let resolved = resolve_exptime_at(huge.as_bytes(), at(NOW)).unwrap();
        assert_ne!(resolved, Expiration::Expired);
    }

    #[test]
    fn test_wall_clock() {
        assert_eq!(resolve_exptime(b"0"), Ok(Expiration::Never));
        assert_eq!(
            resolve_exptime(b"10"),
            Ok(Expiration::After(Duration::from_secs(10)))
        );
    }
}
