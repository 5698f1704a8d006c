//! Geo resolution of extracted addresses
//!
//! The resolver is a black box to the pipeline: one call per address, run on
//! a blocking worker, answering with a location, a miss (`Ok(None)`) or an
//! error that the caller downgrades to a miss.

mod maxmind;

pub use maxmind::MaxMindResolver;

use crate::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// Location data for one address as reported by the resolver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country_code: String,
    pub country: String,
    pub region: String,
    pub city: String,
    /// Optional correlation key supplied by the resolver
    pub city_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Trait for looking up the location of an address.
///
/// Implementations must be safe to call concurrently: each result must
/// correspond only to its own input address.
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> Result<Option<GeoLocation>, ResolveError>;
}

impl<R: GeoResolver + ?Sized> GeoResolver for Arc<R> {
    fn resolve(&self, ip: IpAddr) -> Result<Option<GeoLocation>, ResolveError> {
        (**self).resolve(ip)
    }
}

/// Resolver that never finds anything (no database configured)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl GeoResolver for NoopResolver {
    fn resolve(&self, _ip: IpAddr) -> Result<Option<GeoLocation>, ResolveError> {
        Ok(None)
    }
}

/// Dispatches to one of two independently opened resolvers by address family
pub struct FamilyResolver {
    v4: Arc<dyn GeoResolver>,
    v6: Arc<dyn GeoResolver>,
}

impl FamilyResolver {
    pub fn new(v4: Arc<dyn GeoResolver>, v6: Arc<dyn GeoResolver>) -> Self {
        Self { v4, v6 }
    }
}

impl GeoResolver for FamilyResolver {
    fn resolve(&self, ip: IpAddr) -> Result<Option<GeoLocation>, ResolveError> {
        match ip {
            IpAddr::V4(_) => self.v4.resolve(ip),
            IpAddr::V6(_) => self.v6.resolve(ip),
        }
    }
}
