//! Object id handling: urn encoding for the derivative service and the
//! parsing contract used to derive the viewable id.
//!
//! The derivative service never takes a raw object id. It wants the id
//! base64url-encoded without padding, so the `:` and `/` delimiters inside it
//! never reach a URL path.
//!
//! ## Object id contract
//!
//! The object store returns ids shaped as
//! `urn:<namespace>:os.object:<bucket_key>/<object_name>`. The viewable id
//! handed to the presentation layer is that id with its leading `urn` segment
//! dropped (everything after the first `:`). This is a contract with one
//! storage backend's id format, not a general urn algorithm, so
//! [`parse_object_id`] validates the shape before anything is derived from it.

use crate::error::ForgeError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static OBJECT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^urn:(?P<ns>[^:/]+):os\.object:(?P<bucket>[^:/]+)/(?P<name>.+)$")
        .unwrap()
});

/// The pieces of a storage object id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdParts {
    pub namespace: String,
    pub bucket_key: String,
    pub object_name: String,
}

/// Encode an object id into the urn form the derivative service expects.
pub fn encode_urn(object_id: &str) -> String {
    let urn = URL_SAFE_NO_PAD.encode(object_id.as_bytes());
    debug!("Encoded {} → {}", object_id, urn);
    urn
}

/// Inverse of [`encode_urn`]; `None` if `urn` is not valid base64url UTF-8.
pub fn decode_urn(urn: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(urn.trim_end_matches('='))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Split an object id into namespace, bucket key and object name.
pub fn parse_object_id(object_id: &str) -> Result<ObjectIdParts, ForgeError> {
    let caps = OBJECT_ID
        .captures(object_id)
        .ok_or_else(|| ForgeError::InvalidObjectId {
            object_id: object_id.to_string(),
        })?;
    Ok(ObjectIdParts {
        namespace: caps["ns"].to_string(),
        bucket_key: caps["bucket"].to_string(),
        object_name: caps["name"].to_string(),
    })
}

/// Derive the viewable id: the object id minus its leading `urn` segment.
pub fn derive_viewable_id(object_id: &str) -> Result<String, ForgeError> {
    parse_object_id(object_id)?;
    object_id
        .split_once(':')
        .map(|(_, rest)| rest.to_string())
        .ok_or_else(|| ForgeError::InvalidObjectId {
            object_id: object_id.to_string(),
        })
}
