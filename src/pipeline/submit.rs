//! Translation job submission through the relay.
//!
//! The client never calls the derivative job endpoint directly; it posts the
//! job to [`crate::relay`], which forwards it unchanged. The payload is built
//! here and the relay does not interpret it.

use crate::error::ForgeError;
use crate::pipeline::encode::encode_urn;
use crate::types::{Credential, JobDescriptor, OutputFormat};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Build the job body: `{input: {urn}, output: {formats}}`.
pub fn build_job_payload(encoded_urn: &str, formats: &[OutputFormat]) -> Value {
    json!({
        "input": { "urn": encoded_urn },
        "output": { "formats": formats },
    })
}

/// Submit a translation job for `object_id` via the relay at `relay_job_url`.
///
/// The returned descriptor's `urn` is the job id used for polling; if the
/// service omits it, the encoded urn we submitted is used instead.
///
/// # Errors
/// [`ForgeError::Submission`] when the relay or the derivative service
/// answers non-2xx (status and body are kept), or the relay is unreachable.
pub async fn submit_translation(
    client: &reqwest::Client,
    relay_job_url: &str,
    credential: &Credential,
    object_id: &str,
    formats: &[OutputFormat],
) -> Result<JobDescriptor, ForgeError> {
    let urn = encode_urn(object_id);
    let payload = build_job_payload(&urn, formats);
    debug!("Submitting job for {} via {}", object_id, relay_job_url);

    let response = client
        .post(relay_job_url)
        .header(reqwest::header::AUTHORIZATION, credential.bearer())
        .json(&payload)
        .send()
        .await
        .map_err(|e| ForgeError::Submission {
            status: None,
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ForgeError::Submission {
            status: Some(status.as_u16()),
            detail: body,
        });
    }

    let mut descriptor: JobDescriptor =
        response.json().await.map_err(|e| ForgeError::Submission {
            status: Some(status.as_u16()),
            detail: format!("Unreadable job response: {e}"),
        })?;

    if descriptor.urn.is_empty() {
        descriptor.urn = urn;
    }

    info!("Job accepted ({}): {}", descriptor.result, descriptor.urn);
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let formats = vec![
            OutputFormat::new("svf2", &["2d", "3d"]),
            OutputFormat::new("thumbnail", &[]),
        ];
        let p = build_job_payload("dXJu", &formats);
        assert_eq!(p["input"]["urn"], "dXJu");
        assert_eq!(p["output"]["formats"][0]["type"], "svf2");
        assert_eq!(p["output"]["formats"][0]["views"][1], "3d");
        assert_eq!(p["output"]["formats"][1]["type"], "thumbnail");
    }

    #[tokio::test]
    async fn unreachable_relay_is_submission_error() {
        let client = reqwest::Client::new();
        let credential = Credential {
            token: "t".into(),
            scope: "data:read".into(),
            expires_in: None,
        };
        let err = submit_translation(
            &client,
            "http://127.0.0.1:9/proxy/modelderivative/job",
            &credential,
            "urn:adsk.objects:os.object:b/a.dwg",
            &[OutputFormat::default()],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ForgeError::Submission { status: None, .. }));
    }
}
