//! Configuration management: schema, file loading and validation

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::ConfigLoader;
pub use schema::{normalize_base_path, Config, GeoIpConfig, ServerConfig, StreamConfig};
pub use validator::ConfigValidator;
