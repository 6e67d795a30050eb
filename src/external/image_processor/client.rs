use reqwest::header::CONTENT_TYPE;

use crate::external::client::HTTP_CLIENT;
use crate::external::image_processor::types::{JobSubmission, SubmissionResponse};
use crate::jobs::error::{JobError, JobResult};

/// Thin wrapper over the provider's submit and poll endpoints.
#[derive(Debug, Clone)]
pub struct ImageProcessorClient {
    http: reqwest::Client,
    submit_url: String,
    poll_url: String,
}

impl ImageProcessorClient {
    /// Uses the shared [`HTTP_CLIENT`].
    pub fn new(submit_url: impl Into<String>, poll_url: impl Into<String>) -> Self {
        Self::with_client(HTTP_CLIENT.clone(), submit_url, poll_url)
    }

    pub fn with_client(
        http: reqwest::Client,
        submit_url: impl Into<String>,
        poll_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            submit_url: submit_url.into(),
            poll_url: poll_url.into(),
        }
    }

    pub fn submit_url(&self) -> &str {
        &self.submit_url
    }

    pub fn status_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.poll_url.trim_end_matches('/'), job_id)
    }

    /// POST a job description.
    ///
    /// # Errors
    /// `JobError::Provider` for a non-2xx status or a 2xx body that carries
    /// `results.error`; `JobError::Request` on transport failure.
    pub async fn submit(&self, submission: &JobSubmission) -> JobResult<SubmissionResponse> {
        let response = self
            .http
            .post(&self.submit_url)
            .json(submission)
            .send()
            .await
            .map_err(|e| request_error(&self.submit_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(&self.submit_url, e))?;

        if !status.is_success() {
            return Err(JobError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        // Webhook-mode acknowledgements are not required to be JSON.
        let parsed: SubmissionResponse = serde_json::from_str(&body).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Submission response is not a job document");
            SubmissionResponse::default()
        });
        if let Some(error) = parsed.error() {
            return Err(JobError::Provider {
                status: status.as_u16(),
                body: error.to_string(),
            });
        }

        Ok(parsed)
    }

    /// GET the status of `job_id`, returning the raw body on 2xx.
    pub async fn poll(&self, job_id: &str) -> JobResult<String> {
        let url = self.status_url(job_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| request_error(&url, e))?;
        if !status.is_success() {
            return Err(JobError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// POST `body` unchanged to `callback_url`.
    pub async fn forward(&self, callback_url: &str, body: String) -> JobResult<()> {
        let response = self
            .http
            .post(callback_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| request_error(callback_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn request_error(url: &str, source: reqwest::Error) -> JobError {
    JobError::Request {
        url: url.to_string(),
        source,
    }
}
