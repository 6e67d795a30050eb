use serde::{Deserialize, Serialize};

/// Name of the provider function that scales an image to fit a bounding box.
pub const RESIZE_TO_FIT: &str = "resize_to_fit";

/// Body of the submission POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub application_id: String,
    pub src: String,
    /// Provider API version.
    pub v: String,
    /// Present only when the provider should call back instead of being polled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postback_url: Option<String>,
    pub functions: Vec<ImageFunction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFunction {
    pub name: String,
    pub params: ResizeParams,
    pub save: SaveOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub extension: String,
    pub image_identifier: String,
    pub s3_destination: S3Destination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Destination {
    pub key: String,
    pub bucket: String,
}

/// Synchronous answer to a submission.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub results: Option<SubmissionResults>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmissionResults {
    #[serde(default, deserialize_with = "string_or_number")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SubmissionResponse {
    pub fn job_id(&self) -> Option<&str> {
        self.results
            .as_ref()
            .and_then(|r| r.job_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn error(&self) -> Option<&str> {
        self.results.as_ref().and_then(|r| r.error.as_deref())
    }
}

/// Completed job as returned by the poll endpoint and delivered to callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub results: PollResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResults {
    #[serde(default, deserialize_with = "string_or_number")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub images: Vec<ProcessedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage {
    pub image_identifier: String,
    pub s3_url: String,
}

/// Provider job ids show up both as strings and as bare integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
