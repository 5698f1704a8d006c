//! Streaming core for maptail: IP extraction, geo resolution, bounded history
//! and fan-out to live viewers

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod geo;
pub mod history;
pub mod hub;
pub mod pipeline;
pub mod registry;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, ConfigValidator, GeoIpConfig, ServerConfig, StreamConfig};
pub use error::{MaptailError, ResolveError, Result, ValidationError};
pub use event::{Event, EventKind, GeoRecord};
pub use extract::{extract, Address};
pub use geo::{FamilyResolver, GeoLocation, GeoResolver, MaxMindResolver, NoopResolver};
pub use history::HistoryBuffer;
pub use hub::{Hub, Subscription};
pub use pipeline::{InputSource, LineOutcome, Pipeline, PipelineStats, SourcedLine};
pub use registry::{BroadcastReport, SubscriberId, SubscriberRegistry};
