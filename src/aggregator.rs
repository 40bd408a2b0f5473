//! Source aggregation: flatten provider lists into one ordered, duplicate-free list.

use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;

/// Concatenate lists in the order given and drop exact duplicates,
/// keeping the first occurrence.
///
/// Works on raw strings, so it accepts both normalized CIDRs and raw
/// resolver output.
///
/// # Examples
/// ```
/// use firewall_allowlister::aggregator::aggregate;
/// let lists = vec![vec!["a".to_string(), "b".to_string()], vec!["b".to_string(), "c".to_string()]];
/// assert_eq!(aggregate(&lists), vec!["a", "b", "c"]);
/// ```
pub fn aggregate<S: AsRef<str>>(lists: &[Vec<S>]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for entry in lists.iter().flatten() {
        let entry = entry.as_ref();
        if seen.insert(entry) {
            out.push(entry.to_string());
        }
    }

    out
}

/// Order resolved addresses IPv4 first, then IPv6, preserving resolver
/// order within each family.
pub fn partition_by_family(addrs: &[IpAddr]) -> Vec<String> {
    let (v4, v6): (Vec<&IpAddr>, Vec<&IpAddr>) = addrs.iter().partition(|a| a.is_ipv4());
    v4.into_iter().chain(v6).map(|a| a.to_string()).collect()
}

/// Count entries per address family as `(ipv4, ipv6)`.
///
/// Entries that are neither a bare address nor a CIDR are not counted.
pub fn count_by_family<S: AsRef<str>>(entries: &[S]) -> (usize, usize) {
    entries
        .iter()
        .filter_map(|e| {
            let e = e.as_ref();
            e.parse::<IpNet>()
                .map(|n| n.addr())
                .or_else(|_| e.parse::<IpAddr>())
                .ok()
        })
        .fold((0, 0), |(v4, v6), addr| match addr {
            IpAddr::V4(_) => (v4 + 1, v6),
            IpAddr::V6(_) => (v4, v6 + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|l| l.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_aggregate_dedup_first_seen() {
        let out = aggregate(&lists(&[&["a", "b"], &["b", "c"]]));
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_aggregate_provider_order() {
        let out = aggregate(&lists(&[&["9.9.9.9"], &["1.1.1.1", "9.9.9.9"], &["8.8.8.8"]]));
        assert_eq!(out, vec!["9.9.9.9", "1.1.1.1", "8.8.8.8"]);
    }

    #[test]
    fn test_aggregate_duplicates_within_list() {
        let out = aggregate(&lists(&[&["x", "x", "y", "x"]]));
        assert_eq!(out, vec!["x", "y"]);
    }

    #[test]
    fn test_aggregate_empty() {
        let empty: Vec<Vec<String>> = vec![];
        assert!(aggregate(&empty).is_empty());
        assert!(aggregate(&lists(&[&[], &[]])).is_empty());
    }

    #[test]
    fn test_aggregate_is_exact_match() {
        // raw and normalized forms are different strings
        let out = aggregate(&lists(&[&["1.2.3.4"], &["1.2.3.4/32"]]));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_partition_by_family() {
        let addrs: Vec<IpAddr> = vec![
            "2001:db8::1".parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
            "2001:db8::2".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        ];
        assert_eq!(
            partition_by_family(&addrs),
            vec!["10.0.0.1", "10.0.0.2", "2001:db8::1", "2001:db8::2"]
        );
    }

    #[test]
    fn test_count_by_family() {
        let entries = ["10.0.0.0/8", "1.2.3.4", "2400:cb00::/32", "::1", "junk"];
        assert_eq!(count_by_family(&entries), (2, 2));
    }
}
