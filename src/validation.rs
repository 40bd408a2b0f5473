//! Centralized validation for source addresses, ports and intervals.
//!
//! Every source that ends up in a firewall rule goes through [`normalize`]
//! first, so rules only ever carry syntactically valid CIDR blocks:
//! - a bare IPv4 address becomes `addr/32`
//! - a bare IPv6 address becomes `addr/128`
//! - a CIDR block is returned unchanged

use ipnet::IpNet;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::{AllowlistError, Result};

/// Normalize an IP address or CIDR block string into CIDR notation.
///
/// # Examples
/// ```
/// use firewall_allowlister::validation::normalize;
/// assert_eq!(normalize("10.0.0.1").unwrap(), "10.0.0.1/32");
/// assert_eq!(normalize("::1").unwrap(), "::1/128");
/// assert_eq!(normalize("10.0.0.0/8").unwrap(), "10.0.0.0/8");
/// assert!(normalize("not-an-ip").is_err());
/// ```
pub fn normalize(raw: &str) -> Result<String> {
    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => return Ok(format!("{}/32", raw)),
        Ok(IpAddr::V6(_)) => return Ok(format!("{}/128", raw)),
        Err(_) => {}
    }

    // ipnet rejects prefix lengths that are out of range for the family
    if raw.parse::<IpNet>().is_ok() {
        return Ok(raw.to_string());
    }

    Err(AllowlistError::InvalidAddress(raw.to_string()))
}

/// Normalize a batch of sources.
///
/// Fails on the first invalid entry and returns nothing else, so a
/// malformed list can never turn into a partially populated rule.
pub fn normalize_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<String>> {
    raws.iter().map(|raw| normalize(raw.as_ref())).collect()
}

/// Validate a port number and narrow it to `u16`.
pub fn validate_port(port: i64) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(AllowlistError::InvalidPort(port)),
    }
}

/// Timer interval validation (e.g., "4h", "30m", "1d").
///
/// Requires ASCII-only input to prevent Unicode-related edge cases.
/// Valid suffixes: `s` (seconds), `m` (minutes), `h` (hours), `d` (days)
///
/// # Examples
/// ```
/// use firewall_allowlister::validation::is_valid_interval;
/// assert!(is_valid_interval("4h"));
/// assert!(is_valid_interval("30m"));
/// assert!(!is_valid_interval("4x"));
/// assert!(!is_valid_interval("0h"));
/// ```
pub fn is_valid_interval(interval: &str) -> bool {
    parse_interval(interval).is_some()
}

/// Parse an interval like "24h" into a [`Duration`]. Zero is rejected.
pub fn parse_interval(interval: &str) -> Option<Duration> {
    if !interval.is_ascii() || interval.len() < 2 {
        return None;
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);
    let n: u64 = num_part.parse().ok()?;
    if n == 0 {
        return None;
    }

    let secs = match suffix {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ipv4() {
        assert_eq!(normalize("10.0.0.1").unwrap(), "10.0.0.1/32");
        assert_eq!(normalize("192.168.1.1").unwrap(), "192.168.1.1/32");
    }

    #[test]
    fn test_normalize_ipv6() {
        assert_eq!(normalize("::1").unwrap(), "::1/128");
        assert_eq!(normalize("2001:db8::1").unwrap(), "2001:db8::1/128");
    }

    #[test]
    fn test_normalize_cidr_unchanged() {
        assert_eq!(normalize("10.0.0.0/8").unwrap(), "10.0.0.0/8");
        assert_eq!(normalize("2400:cb00::/32").unwrap(), "2400:cb00::/32");
        // host bits set are still a valid block
        assert_eq!(normalize("10.0.0.5/8").unwrap(), "10.0.0.5/8");
    }

    #[test]
    fn test_normalize_invalid() {
        for bad in ["not-an-ip", "", "192.168.1.0/33", "::/129", "1.2.3", "10.0.0.1/"] {
            let err = normalize(bad).unwrap_err();
            assert!(
                matches!(err, AllowlistError::InvalidAddress(ref s) if s == bad),
                "expected InvalidAddress for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_normalize_all_mixed() {
        let out = normalize_all(&["192.168.1.1", "10.0.0.0/8", "2001:db8::1"]).unwrap();
        assert_eq!(out, vec!["192.168.1.1/32", "10.0.0.0/8", "2001:db8::1/128"]);
    }

    #[test]
    fn test_normalize_all_atomic_failure() {
        let err = normalize_all(&["10.0.0.1", "bad"]).unwrap_err();
        assert!(matches!(err, AllowlistError::InvalidAddress(ref s) if s == "bad"));
    }

    #[test]
    fn test_normalize_all_empty() {
        let empty: [&str; 0] = [];
        assert!(normalize_all(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(22).unwrap(), 22);
        assert_eq!(validate_port(1).unwrap(), 1);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(matches!(validate_port(0), Err(AllowlistError::InvalidPort(0))));
        assert!(matches!(validate_port(-1), Err(AllowlistError::InvalidPort(-1))));
        assert!(matches!(
            validate_port(65536),
            Err(AllowlistError::InvalidPort(65536))
        ));
    }

    #[test]
    fn test_valid_interval() {
        assert!(is_valid_interval("4h"));
        assert!(is_valid_interval("30m"));
        assert!(is_valid_interval("1d"));
        assert!(is_valid_interval("60s"));

        assert!(!is_valid_interval(""));
        assert!(!is_valid_interval("h"));
        assert!(!is_valid_interval("4"));
        assert!(!is_valid_interval("4x"));
        assert!(!is_valid_interval("0m"));
        assert!(!is_valid_interval("４h"));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_interval("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_interval("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_interval("2d"), Some(Duration::from_secs(172_800)));
        assert_eq!(parse_interval("-1h"), None);
    }
}
