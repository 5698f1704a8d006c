//! IP address extraction from free-form log lines
//!
//! Three complementary passes run over each line and their results are
//! merged in discovery order:
//! 1. whitespace/punctuation tokenizer, each token validated as IPv4 or IPv6
//! 2. strict dotted-quad scan for addresses glued to other punctuation
//! 3. bracketed host literals such as `[2001:db8::1]:443`

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::LazyLock;

static TOKEN_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,;()\[\]{}<>]+").expect("valid separator pattern"));

static DOTTED_QUAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4][0-9]|1?[0-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1?[0-9]?[0-9])\b",
    )
    .expect("valid dotted-quad pattern")
});

static BRACKETED_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([0-9A-Fa-f:.]+(?:%[0-9A-Za-z_.\-]+)?)\]").expect("valid bracket pattern")
});

/// A validated address found in a line, kept in the textual form it had
/// in the input (minus any IPv6 zone suffix)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    text: String,
    ip: IpAddr,
}

impl Address {
    /// Validate a candidate string as an IPv4 or IPv6 address.
    /// An IPv6 zone suffix (`fe80::1%eth0`) is accepted and dropped.
    pub fn parse(candidate: &str) -> Option<Self> {
        if let Ok(ip) = candidate.parse::<IpAddr>() {
            return Some(Self {
                text: candidate.to_string(),
                ip,
            });
        }

        let (addr, zone) = candidate.split_once('%')?;
        if zone.is_empty() {
            return None;
        }
        let ip = addr.parse::<Ipv6Addr>().ok()?;
        Some(Self {
            text: addr.to_string(),
            ip: IpAddr::V6(ip),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn is_ipv4(&self) -> bool {
        self.ip.is_ipv4()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Insertion-ordered set of addresses for one line
#[derive(Default)]
struct Collector {
    seen: HashSet<String>,
    out: Vec<Address>,
}

impl Collector {
    fn offer(&mut self, addr: Address) {
        if self.seen.insert(addr.text.clone()) {
            self.out.push(addr);
        }
    }
}

/// Extract the unique IPv4/IPv6 addresses of `line` in first-occurrence order
pub fn extract(line: &str) -> Vec<Address> {
    let mut found = Collector::default();

    // First pass: tokenize on common separators.
    for raw in TOKEN_SEPARATORS.split(line) {
        let token = trim_token(raw);
        if token.is_empty() {
            continue;
        }
        if let Some(addr) = Address::parse(token) {
            found.offer(addr);
        }
    }

    // Second pass: dotted quads adjacent to punctuation the tokenizer kept.
    for m in DOTTED_QUAD.find_iter(line) {
        // The pattern accepts octets like "01" which the parser does not.
        if let Some(addr) = Address::parse(m.as_str()) {
            found.offer(addr);
        }
    }

    // Third pass: bracketed host literals.
    for caps in BRACKETED_HOST.captures_iter(line) {
        if let Some(addr) = caps.get(1).and_then(|m| Address::parse(m.as_str())) {
            found.offer(addr);
        }
    }

    found.out
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Strip characters that can neither start nor end an address
fn trim_token(raw: &str) -> &str {
    raw.trim_start_matches(|c: char| !(is_word(c) || c == ':'))
        .trim_end_matches(|c: char| !(is_word(c) || c == ':' || c == '.' || c == '%'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &str) -> Vec<String> {
        extract(line).iter().map(|a| a.as_str().to_string()).collect()
    }

    #[test]
    fn test_empty_and_plain_text() {
        assert!(extract("").is_empty());
        assert!(extract("no ips here").is_empty());
        assert!(extract("   \t  ").is_empty());
    }

    #[test]
    fn test_duplicates_collapsed() {
        assert_eq!(
            texts("requests from 10.0.0.1 and 10.0.0.1 again"),
            vec!["10.0.0.1"]
        );
    }

    #[test]
    fn test_bracketed_ipv6_and_invalid_quad() {
        assert_eq!(
            texts("edge [2001:db8::1]:443 and 999.999.999.999"),
            vec!["2001:db8::1"]
        );
    }

    #[test]
    fn test_pass_order() {
        // Only 1.1.1.1 is a clean token; the rest surface in the dotted-quad
        // pass, in line order.
        assert_eq!(
            texts("a=192.168.1.1 b=8.8.8.8, c=(1.1.1.1) d=8.8.8.8"),
            vec!["1.1.1.1", "192.168.1.1", "8.8.8.8"]
        );
    }

    #[test]
    fn test_tokenizer_order_wins() {
        // 1.1.1.1 is a clean token, 10.0.0.1 only surfaces in the regex pass
        assert_eq!(
            texts("upstream=10.0.0.1:8080 client 1.1.1.1"),
            vec!["1.1.1.1", "10.0.0.1"]
        );
    }

    #[test]
    fn test_apache_combined_line() {
        let line = r#"203.0.113.9 - - [10/Oct/2025:13:55:36 +0000] "GET /x HTTP/1.1" 200 512 "-" "curl/8.7.1""#;
        assert_eq!(texts(line), vec!["203.0.113.9"]);
    }

    #[test]
    fn test_trailing_punctuation() {
        assert_eq!(texts("connection from 8.8.4.4."), vec!["8.8.4.4"]);
        assert_eq!(texts("peer \"2001:db8::42\" closed"), vec!["2001:db8::42"]);
        assert_eq!(texts("ip='9.9.9.9'"), vec!["9.9.9.9"]);
    }

    #[test]
    fn test_out_of_range_octets_excluded() {
        assert!(extract("256.1.1.1 and 1.2.3.256 and 300.300.300.300").is_empty());
    }

    #[test]
    fn test_leading_zero_octets_excluded() {
        assert!(extract("legacy 010.001.002.003 notation").is_empty());
    }

    #[test]
    fn test_zone_id_suffix() {
        assert_eq!(texts("link-local fe80::1%eth0 up"), vec!["fe80::1"]);
        assert_eq!(texts("bracketed [fe80::2%en0]:22"), vec!["fe80::2"]);
        assert!(extract("bogus fe80::1% zone").is_empty());
    }

    #[test]
    fn test_ipv4_mapped_ipv6() {
        let found = extract("client ::ffff:192.0.2.128 connected");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].as_str(), "::ffff:192.0.2.128");
        assert!(!found[0].is_ipv4());
        assert_eq!(found[1].as_str(), "192.0.2.128");
        assert!(found[1].is_ipv4());
    }

    #[test]
    fn test_times_and_versions_ignored() {
        assert!(extract("12:30:45 took 1.5s v2.0.1").is_empty());
    }

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("2001:db8::1").unwrap();
        assert_eq!(addr.to_string(), "2001:db8::1");
        assert_eq!(addr.ip(), "2001:db8::1".parse::<IpAddr>().unwrap());
        assert!(Address::parse("example.com").is_none());
        assert!(Address::parse("1.2.3").is_none());
    }

    #[test]
    fn test_no_duplicates_property() {
        let lines = [
            "1.2.3.4 1.2.3.4, [1.2.3.4] (1.2.3.4)",
            "[::1] ::1 [::1]:80",
            "x 5.6.7.8;5.6.7.8;[2001:db8::5] 2001:db8::5",
        ];
        for line in lines {
            let found = texts(line);
            let unique: HashSet<_> = found.iter().collect();
            assert_eq!(unique.len(), found.len(), "duplicates in {:?}", found);
        }
    }
}
