//! Data model shared by the pipeline stages.
//!
//! Every value here is created by exactly one stage and handed forward by
//! value: the credential by [`crate::pipeline::auth`], the stored object by
//! [`crate::pipeline::storage`], the job by [`crate::pipeline::submit`] and
//! [`crate::pipeline::poll`], the viewable reference by
//! [`crate::orchestrator`]. None of them is mutated after construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bearer token obtained from the credential exchange.
///
/// Lives for one [`crate::Session`]; never renewed mid-session and never
/// persisted. `Debug` redacts the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    /// Space-separated scope the token was requested with.
    pub scope: String,
    /// Lifetime reported by the service, in seconds, when present.
    pub expires_in: Option<u64>,
}

impl Credential {
    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Retention policy of a storage container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketPolicy {
    /// Objects are removed by the service after 24 hours. (default)
    #[default]
    Transient,
    /// Objects are kept until deleted.
    Persistent,
}

impl BucketPolicy {
    /// The `policyKey` value sent to the object store.
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketPolicy::Transient => "transient",
            BucketPolicy::Persistent => "persistent",
        }
    }
}

/// Outcome of [`crate::pipeline::storage::ensure_container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// This call created the container.
    Created,
    /// The container was already there (HTTP 409).
    AlreadyExisted,
}

/// An object successfully stored in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub bucket_key: String,
    #[serde(rename = "objectKey")]
    pub object_name: String,
    /// Compound id: `urn:<ns>:os.object:<bucket_key>/<object_name>`.
    pub object_id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// One requested derivative output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub views: Vec<String>,
}

impl OutputFormat {
    pub fn new(kind: impl Into<String>, views: &[&str]) -> Self {
        Self {
            kind: kind.into(),
            views: views.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Default for OutputFormat {
    /// SVF2 with both 2D sheets and 3D views.
    fn default() -> Self {
        Self::new("svf2", &["2d", "3d"])
    }
}

/// The response of a job submission, as returned by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    /// `"created"` for a new job, `"success"` when derivatives already exist.
    #[serde(default)]
    pub result: String,
    /// Encoded urn of the input; doubles as the job id.
    #[serde(default)]
    pub urn: String,
    #[serde(default)]
    pub accepted_jobs: Option<serde_json::Value>,
}

/// Lifecycle of a translation job as observed through polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    #[serde(rename = "inprogress")]
    InProgress,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "inprogress",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted translation job and its last observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationJob {
    pub job_id: String,
    /// Raw object id of the input.
    pub input_object_id: String,
    pub requested_formats: Vec<OutputFormat>,
    pub status: JobStatus,
    pub progress_percent: u8,
}

/// What the presentation layer needs to render a translated model.
///
/// Only ever built from a job whose status is [`JobStatus::Complete`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewableReference {
    /// The object id with its leading `urn` segment removed.
    pub derived_id: String,
    /// Encoded urn the job was submitted with.
    pub urn: String,
    /// Bearer token the viewer uses to fetch derivatives.
    pub credential: String,
}

impl fmt::Debug for ViewableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewableReference")
            .field("derived_id", &self.derived_id)
            .field("urn", &self.urn)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Timing and polling statistics of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Manifest queries issued.
    pub poll_count: u32,
    /// Container bootstrap plus upload.
    pub upload_ms: u64,
    /// Submission until terminal state.
    pub translate_ms: u64,
    pub total_ms: u64,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationOutput {
    pub viewable: ViewableReference,
    pub object: StoredObject,
    pub job: TranslationJob,
    pub stats: PipelineStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_redacts_token() {
        let c = Credential {
            token: "eyJsecret".into(),
            scope: "data:read".into(),
            expires_in: Some(3599),
        };
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("eyJsecret"));
        assert_eq!(c.bearer(), "Bearer eyJsecret");
    }

    #[test]
    fn stored_object_parses_upload_response() {
        let body = r#"{
            "bucketKey": "bucket-000000000000-mu5quhmaq",
            "contentType": "application/octet-stream",
            "location": "https://developer.api.autodesk.com/oss/v2/buckets/bucket-000000000000-mu5quhmaq/objects/EQT1.dwg",
            "objectId": "urn:adsk.objects:os.object:bucket-000000000000-mu5quhmaq/EQT1.dwg",
            "objectKey": "EQT1.dwg",
            "sha1": "000000000000000000000",
            "size": 133991
        }"#;
        let obj: StoredObject = serde_json::from_str(body).unwrap();
        assert_eq!(obj.bucket_key, "bucket-000000000000-mu5quhmaq");
        assert_eq!(obj.object_name, "EQT1.dwg");
        assert_eq!(obj.size, 133991);
        assert_eq!(obj.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn output_format_serialises_type_field() {
        let json = serde_json::to_value(OutputFormat::default()).unwrap();
        assert_eq!(json["type"], "svf2");
        assert_eq!(json["views"], serde_json::json!(["2d", "3d"]));
    }

    #[test]
    fn viewable_reference_uses_presentation_field_names() {
        let v = ViewableReference {
            derived_id: "adsk.objects:os.object:b/a.dwg".into(),
            urn: "dXJu".into(),
            credential: "tok".into(),
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["derivedId"], "adsk.objects:os.object:b/a.dwg");
        assert_eq!(json["credential"], "tok");
        assert!(format!("{v:?}").contains("<redacted>"));
    }

    #[test]
    fn job_status_terminal_states() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert_eq!(JobStatus::InProgress.to_string(), "inprogress");
    }
}
