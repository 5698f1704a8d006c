//! MaxMind (GeoLite2/GeoIP2 City) backed resolver

use super::{GeoLocation, GeoResolver};
use crate::error::{MaptailError, ResolveError, Result};
use maxminddb::{PathElement, Reader};
use std::net::IpAddr;
use std::path::Path;

/// Resolver over one opened City database.
///
/// The reader is immutable after opening, so concurrent lookups need no
/// locking.
pub struct MaxMindResolver {
    reader: Reader<Vec<u8>>,
}

impl MaxMindResolver {
    /// Open a database file. Failure here is a fatal startup error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| MaptailError::GeoDatabaseRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let reader = Reader::from_source(bytes).map_err(|e| MaptailError::GeoDatabase {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::info!(
            "Opened geo database {:?} ({})",
            path,
            reader.metadata.database_type
        );

        Ok(Self { reader })
    }
}

impl GeoResolver for MaxMindResolver {
    fn resolve(&self, ip: IpAddr) -> std::result::Result<Option<GeoLocation>, ResolveError> {
        let lookup = self.reader.lookup(ip)?;
        if !lookup.has_data() {
            return Ok(None);
        }

        let text = |path: &[PathElement]| -> std::result::Result<String, ResolveError> {
            Ok(lookup.decode_path::<String>(path)?.unwrap_or_default())
        };

        let latitude = lookup.decode_path::<f64>(&[
            PathElement::Key("location"),
            PathElement::Key("latitude"),
        ])?;
        let longitude = lookup.decode_path::<f64>(&[
            PathElement::Key("location"),
            PathElement::Key("longitude"),
        ])?;

        // Without coordinates there is nothing to put on a map.
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Ok(None);
        };

        Ok(Some(GeoLocation {
            country_code: text(&[PathElement::Key("country"), PathElement::Key("iso_code")])?,
            country: text(&[
                PathElement::Key("country"),
                PathElement::Key("names"),
                PathElement::Key("en"),
            ])?,
            region: text(&[
                PathElement::Key("subdivisions"),
                PathElement::Index(0),
                PathElement::Key("names"),
                PathElement::Key("en"),
            ])?,
            city: text(&[
                PathElement::Key("city"),
                PathElement::Key("names"),
                PathElement::Key("en"),
            ])?,
            city_code: None,
            latitude,
            longitude,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_missing_file() {
        let result = MaxMindResolver::open("/nonexistent/GeoLite2-City.mmdb");
        assert!(matches!(result, Err(MaptailError::GeoDatabaseRead { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a maxmind database").unwrap();

        let result = MaxMindResolver::open(file.path());
        assert!(matches!(result, Err(MaptailError::GeoDatabase { .. })));
    }
}
