use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use ipnet::Ipv4Net;
use rand::{rng, Rng};
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "maptail-loggen")]
#[command(about = "Write fake combined-format access log lines with public client addresses")]
struct Args {
    /// Number of lines to write
    #[arg(long, env = "COUNT", default_value = "100")]
    count: u64,

    /// Pace output, e.g. 10/s, 100/m or 5/h (a bare number means per second)
    #[arg(long, env = "RATE", value_parser = parse_rate)]
    rate: Option<Duration>,
}

/// Converts "N/unit" into the delay between lines
fn parse_rate(s: &str) -> Result<Duration, String> {
    let (count, unit) = s.split_once('/').unwrap_or((s, "s"));
    let count: u64 = count
        .parse()
        .map_err(|_| format!("invalid rate {:?}, expected N/s, N/m or N/h", s))?;
    let period_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return Err(format!("invalid rate unit {:?}, expected s, m or h", unit)),
    };
    Ok(Duration::from_millis(period_ms / count.max(1)))
}

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];
const STATUSES: &[u16] = &[
    200, 200, 200, 201, 204, 301, 302, 304, 400, 401, 403, 404, 429, 500, 502, 503,
];
const PATHS: &[&str] = &[
    "/",
    "/home",
    "/products",
    "/products/123",
    "/cart",
    "/checkout",
    "/api/v1/users",
    "/api/v1/orders",
    "/search?q=shoes",
    "/login",
    "/logout",
    "/about",
];
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:130.0) Gecko/20100101 Firefox/130.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "curl/8.7.1",
    "okhttp/4.12.0",
];
const REFERRERS: &[&str] = &[
    "-",
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://news.ycombinator.com/",
    "https://twitter.com/",
    "https://github.com/",
];
const CITIES: &[&str] = &[
    "New York",
    "London",
    "Tokyo",
    "Paris",
    "Los Angeles",
    "Singapore",
    "Sydney",
    "Berlin",
    "Toronto",
    "Sao Paulo",
    "Mumbai",
    "Cairo",
    "Johannesburg",
    "Mexico City",
    "Chicago",
    "Seoul",
    "Madrid",
];

/// IPv4 blocks that never show up as real clients
const RESERVED_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 88, 99, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// Global /32 prefixes that usually geolocate (Google, Cloudflare, Meta,
/// Akamai, AWS)
const KNOWN_V6_PREFIXES: &[[u16; 2]] = &[
    [0x2001, 0x4860],
    [0x2607, 0xf8b0],
    [0x2a00, 0x1450],
    [0x2404, 0x6800],
    [0x2606, 0x4700],
    [0x2a03, 0x2880],
    [0x2a02, 0x26f0],
    [0x2a05, 0xd014],
];

fn pick<'a, T, R: Rng>(rng: &mut R, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    RESERVED_V4.iter().any(|&(network, prefix)| {
        Ipv4Net::new(network, prefix)
            .map(|net| net.contains(&ip))
            .unwrap_or(false)
    })
}

fn random_ipv4<R: Rng>(rng: &mut R) -> Ipv4Addr {
    loop {
        let ip = Ipv4Addr::from(rng.random::<u32>());
        if !is_reserved_v4(ip) {
            return ip;
        }
    }
}

fn random_ipv6<R: Rng>(rng: &mut R) -> Ipv6Addr {
    let prefix = pick(rng, KNOWN_V6_PREFIXES);
    let mut segments = [0u16; 8];
    segments[..2].copy_from_slice(prefix);
    for segment in &mut segments[2..] {
        *segment = rng.random();
    }
    Ipv6Addr::from(segments)
}

fn random_ip<R: Rng>(rng: &mut R) -> IpAddr {
    if rng.random_bool(0.7) {
        IpAddr::V4(random_ipv4(rng))
    } else {
        IpAddr::V6(random_ipv6(rng))
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d/%b/%Y:%H:%M:%S +0000").to_string()
}

fn build_path<R: Rng>(rng: &mut R) -> String {
    let base = pick(rng, PATHS);
    let city = pick(rng, CITIES).replace(' ', "%20");
    if base.contains('?') {
        format!("{}&city={}", base, city)
    } else if *base != "/" && rng.random_bool(0.3) {
        format!("{}/{}", base, city.to_lowercase().replace("%20", "-"))
    } else {
        format!("{}?city={}", base, city)
    }
}

fn build_log_line<R: Rng>(rng: &mut R, at: DateTime<Utc>) -> String {
    format!(
        "{} - - [{}] \"{} {} HTTP/1.1\" {} {} \"{}\" \"{}\"",
        random_ip(rng),
        format_date(at),
        pick(rng, METHODS),
        build_path(rng),
        pick(rng, STATUSES),
        rng.random_range(200..=200_000),
        pick(rng, REFERRERS),
        pick(rng, USER_AGENTS),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut rng = rng();
    let start = Utc::now();
    let stdout = io::stdout();

    for i in 0..args.count {
        let step_ms = match args.rate {
            Some(interval) => interval.as_millis() as i64,
            None => rng.random_range(0..=250),
        };
        let line = build_log_line(&mut rng, start + ChronoDuration::milliseconds(i as i64 * step_ms));

        let written = {
            let mut out = stdout.lock();
            writeln!(out, "{}", line).and_then(|_| out.flush())
        };
        match written {
            Ok(()) => {}
            // Reader went away (e.g. `| head`)
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if let Some(interval) = args.rate {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("10/s").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_rate("100/m").unwrap(), Duration::from_millis(600));
        assert_eq!(parse_rate("5/h").unwrap(), Duration::from_millis(720_000));
        assert_eq!(parse_rate("4").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_rate("0/s").unwrap(), Duration::from_millis(1_000));
        assert!(parse_rate("fast").is_err());
        assert!(parse_rate("10/d").is_err());
    }

    #[test]
    fn test_format_date() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(format_date(at), "07/Mar/2024:09:05:02 +0000");
    }

    #[test]
    fn test_reserved_ranges() {
        assert!(is_reserved_v4(Ipv4Addr::new(10, 1, 2, 3)));
        assert!(is_reserved_v4(Ipv4Addr::new(192, 168, 0, 1)));
        assert!(is_reserved_v4(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(is_reserved_v4(Ipv4Addr::new(239, 255, 255, 250)));
        assert!(!is_reserved_v4(Ipv4Addr::new(8, 8, 8, 8)));
        assert!(!is_reserved_v4(Ipv4Addr::new(172, 32, 0, 1)));
    }

    #[test]
    fn test_generated_addresses_are_public() {
        let mut rng = rng();
        for _ in 0..500 {
            match random_ip(&mut rng) {
                IpAddr::V4(ip) => assert!(!is_reserved_v4(ip), "{}", ip),
                IpAddr::V6(ip) => {
                    let prefix = [ip.segments()[0], ip.segments()[1]];
                    assert!(KNOWN_V6_PREFIXES.contains(&prefix), "{}", ip);
                }
            }
        }
    }

    #[test]
    fn test_log_line_shape() {
        let mut rng = rng();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let line = build_log_line(&mut rng, at);

        let (ip, rest) = line.split_once(' ').unwrap();
        assert!(ip.parse::<IpAddr>().is_ok(), "{}", line);
        assert!(rest.starts_with("- - [02/Jan/2024:03:04:05 +0000] \""));
        assert!(rest.contains(" HTTP/1.1\" "));
        assert!(line.ends_with('"'));
    }
}
