//! Resolved geo records and the outbound event model

use crate::error::Result;
use crate::extract::Address;
use crate::geo::GeoLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel sent to viewers when the resolver supplied no city code
pub const UNKNOWN_CITY_CODE: &str = "0";

/// One resolved address at one point in time. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    pub country: String,
    pub region: String,
    pub city: String,
    #[serde(rename = "code")]
    pub city_code: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "date", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl GeoRecord {
    pub fn new(address: &Address, location: GeoLocation, timestamp: DateTime<Utc>) -> Self {
        Self {
            address: address.as_str().to_string(),
            country_code: location.country_code,
            country: location.country,
            region: location.region,
            city: location.city,
            city_code: location
                .city_code
                .filter(|code| !code.is_empty())
                .unwrap_or_else(|| UNKNOWN_CITY_CODE.to_string()),
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp,
        }
    }
}

/// Event tag on the wire: geo events are unnamed, raw lines are "log"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Geo,
    Log,
}

impl EventKind {
    /// SSE event name, `None` for the default (unnamed) event
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            EventKind::Geo => None,
            EventKind::Log => Some("log"),
        }
    }
}

/// One outbound message. The JSON payload is encoded once and shared by
/// every subscriber queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    data: Arc<str>,
}

impl Event {
    pub fn geo(record: &GeoRecord) -> Result<Self> {
        Ok(Self {
            kind: EventKind::Geo,
            data: serde_json::to_string(record)?.into(),
        })
    }

    /// Raw line as a bare JSON string
    pub fn log(line: &str) -> Self {
        Self {
            kind: EventKind::Log,
            data: serde_json::Value::from(line).to_string().into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// JSON-encoded payload
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Server-sent events framing of this event
    pub fn to_sse(&self) -> String {
        match self.kind.event_name() {
            Some(name) => format!("event: {}\ndata: {}\n\n", name, self.data),
            None => format!("data: {}\n\n", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record(city_code: Option<&str>) -> GeoRecord {
        let address = Address::parse("8.8.8.8").unwrap();
        let location = GeoLocation {
            country_code: "US".to_string(),
            country: "United States".to_string(),
            region: "CA".to_string(),
            city: "Mountain View".to_string(),
            city_code: city_code.map(str::to_string),
            latitude: 37.4,
            longitude: -122.1,
        };
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        GeoRecord::new(&address, location, at)
    }

    #[test]
    fn test_geo_record_wire_shape() {
        let event = Event::geo(&sample_record(None)).unwrap();
        let json: serde_json::Value = serde_json::from_str(event.data()).unwrap();

        assert_eq!(json["ip"], "8.8.8.8");
        assert_eq!(json["countryCode"], "US");
        assert_eq!(json["country"], "United States");
        assert_eq!(json["region"], "CA");
        assert_eq!(json["city"], "Mountain View");
        assert_eq!(json["code"], "0");
        assert_eq!(json["latitude"], 37.4);
        assert_eq!(json["longitude"], -122.1);
        assert_eq!(json["date"], 1_700_000_000_123i64);
    }

    #[test]
    fn test_city_code_passthrough() {
        assert_eq!(sample_record(Some("MTV")).city_code, "MTV");
        assert_eq!(sample_record(Some("")).city_code, UNKNOWN_CITY_CODE);
    }

    #[test]
    fn test_geo_sse_is_unnamed() {
        let event = Event::geo(&sample_record(None)).unwrap();
        let frame = event.to_sse();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert!(!frame.contains("event:"));
    }

    #[test]
    fn test_log_event_is_json_string() {
        let event = Event::log("GET /x \"quoted\"");
        assert_eq!(event.kind(), EventKind::Log);
        assert_eq!(event.data(), r#""GET /x \"quoted\"""#);
        assert_eq!(
            event.to_sse(),
            "event: log\ndata: \"GET /x \\\"quoted\\\"\"\n\n"
        );
    }
}
