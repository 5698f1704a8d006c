//! Viewer assets served from the public directory

use std::path::{Component, Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum AssetError {
    NotFound,
    Forbidden,
    BadPath,
}

/// A file read from the asset root, ready to send
#[derive(Debug)]
pub struct Asset {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Maps the part of a request path below the base path to a file under
/// `root`. An empty path or "/" selects `index.html`.
pub fn resolve_asset_path(root: &Path, rel: &str) -> Result<PathBuf, AssetError> {
    let decoded = percent_encoding::percent_decode_str(rel)
        .decode_utf8()
        .map_err(|_| AssetError::BadPath)?;
    let decoded = decoded.trim_start_matches('/');

    let relative_path = if decoded.is_empty() || decoded.ends_with('/') {
        PathBuf::from(decoded).join("index.html")
    } else {
        PathBuf::from(decoded)
    };

    for component in relative_path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(AssetError::Forbidden),
        }
    }

    Ok(root.join(relative_path))
}

/// Content type by extension, unknown extensions are binary
pub fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || mime.subtype() == mime_guess::mime::JAVASCRIPT
        || mime.subtype() == mime_guess::mime::JSON;
    if textual {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// Resolves and reads an asset. Symlinks leading outside `root` are refused.
pub async fn load_asset(root: &Path, rel: &str) -> Result<Asset, AssetError> {
    let path = resolve_asset_path(root, rel)?;

    let root_canon = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| AssetError::NotFound)?;
    let target = tokio::fs::canonicalize(&path)
        .await
        .map_err(|_| AssetError::NotFound)?;
    if !target.starts_with(&root_canon) {
        return Err(AssetError::Forbidden);
    }

    let body = tokio::fs::read(&target)
        .await
        .map_err(|_| AssetError::NotFound)?;

    Ok(Asset {
        body,
        content_type: content_type(&target),
    })
}
