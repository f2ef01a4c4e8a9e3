//! Object store gateway: container bootstrap and raw-byte upload.
//!
//! Every upload gets its own freshly named container so unrelated sessions
//! never write into each other's namespace. Creation is idempotent: the store
//! answers 409 when the key is taken and that is treated as success.

use crate::error::ForgeError;
use crate::types::{BucketPolicy, ContainerStatus, Credential, StoredObject};
use rand::Rng;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

static LAST_KEY_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Generate a container key of the form `bucket-<millis>-<suffix>`.
///
/// The millisecond part never repeats or goes backwards within a process;
/// the 9-character base36 suffix makes clashes across processes negligible,
/// though not impossible. Keys satisfy the store's `[-_.a-z0-9]{3,128}` rule.
pub fn generate_bucket_key() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let millis = monotonic_millis(now);

    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("bucket-{millis}-{suffix}")
}

fn monotonic_millis(now: u64) -> u64 {
    let mut prev = LAST_KEY_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_KEY_MILLIS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Make sure `bucket_key` exists.
///
/// # Errors
/// [`ForgeError::Storage`] for any response other than 2xx or 409, or when
/// the store is unreachable.
pub async fn ensure_container(
    client: &reqwest::Client,
    api_url: &str,
    credential: &Credential,
    bucket_key: &str,
    policy: BucketPolicy,
) -> Result<ContainerStatus, ForgeError> {
    let url = format!("{api_url}/oss/v2/buckets");
    let storage_err = |status: Option<u16>, detail: String| ForgeError::Storage {
        bucket_key: bucket_key.to_string(),
        status,
        detail,
    };

    let response = client
        .post(&url)
        .bearer_auth(&credential.token)
        .json(&json!({ "bucketKey": bucket_key, "policyKey": policy.as_str() }))
        .send()
        .await
        .map_err(|e| storage_err(None, e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        info!("Bucket '{}' created ({})", bucket_key, policy.as_str());
        return Ok(ContainerStatus::Created);
    }
    if status == StatusCode::CONFLICT {
        info!("Bucket '{}' already exists", bucket_key);
        return Ok(ContainerStatus::AlreadyExisted);
    }

    let body = response.text().await.unwrap_or_default();
    Err(storage_err(Some(status.as_u16()), body))
}

/// Upload `payload` as `object_name` into `bucket_key`.
///
/// The bytes are the request body as-is; no multipart wrapping. The object
/// name is percent-encoded as a single path segment, so names containing
/// spaces or `#` survive.
///
/// # Errors
/// [`ForgeError::Upload`] on a non-2xx response, an unreachable store, or a
/// response body without `objectId`.
pub async fn upload_object(
    client: &reqwest::Client,
    api_url: &str,
    credential: &Credential,
    bucket_key: &str,
    object_name: &str,
    payload: Vec<u8>,
    content_type: &str,
) -> Result<StoredObject, ForgeError> {
    let upload_err = |status: Option<u16>, detail: String| ForgeError::Upload {
        object_name: object_name.to_string(),
        status,
        detail,
    };

    let url = object_url(api_url, bucket_key, object_name)
        .map_err(|e| upload_err(None, e))?;
    let size = payload.len();
    debug!("PUT {} ({} bytes, {})", url, size, content_type);

    let response = client
        .put(url)
        .bearer_auth(&credential.token)
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .body(payload)
        .send()
        .await
        .map_err(|e| upload_err(None, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(upload_err(Some(status.as_u16()), body));
    }

    let object: StoredObject = response.json().await.map_err(|e| {
        upload_err(
            Some(status.as_u16()),
            format!("Unreadable upload response: {e}"),
        )
    })?;

    if object.object_id.is_empty() {
        return Err(upload_err(
            Some(status.as_u16()),
            "Upload response did not contain an objectId".into(),
        ));
    }

    info!(
        "Uploaded '{}' ({} bytes) → {}",
        object_name, object.size, object.object_id
    );
    Ok(object)
}

/// Best-effort removal of a container, used when a run fails after creating it.
pub async fn delete_container(
    client: &reqwest::Client,
    api_url: &str,
    credential: &Credential,
    bucket_key: &str,
) -> Result<(), ForgeError> {
    let url = format!("{api_url}/oss/v2/buckets/{bucket_key}");
    let response = client
        .delete(&url)
        .bearer_auth(&credential.token)
        .send()
        .await
        .map_err(|e| ForgeError::Storage {
            bucket_key: bucket_key.to_string(),
            status: None,
            detail: e.to_string(),
        })?;

    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_FOUND {
        info!("Bucket '{}' deleted", bucket_key);
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    warn!("Deleting bucket '{}' failed: HTTP {}", bucket_key, status);
    Err(ForgeError::Storage {
        bucket_key: bucket_key.to_string(),
        status: Some(status.as_u16()),
        detail: body,
    })
}

/// `{api_url}/oss/v2/buckets/{bucket}/objects/{name}` with each piece encoded.
fn object_url(api_url: &str, bucket_key: &str, object_name: &str) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(api_url).map_err(|e| format!("Invalid API URL: {e}"))?;
    url.path_segments_mut()
        .map_err(|_| format!("API URL cannot be a base: '{api_url}'"))?
        .pop_if_empty()
        .extend(["oss", "v2", "buckets", bucket_key, "objects", object_name]);
    Ok(url)
}
