//! Image resize through the external provider.
//!
//! A submission either names a `postback_url` and finishes as soon as the
//! provider accepts it, or (in poll mode) polls the provider until the job
//! completes and forwards the finished document to the callback URL itself.
//! Poll mode is bounded by an absolute deadline measured from task start.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use validator::Validate;

use crate::external::image_processor::types::{
    ImageFunction, JobSubmission, PollResponse, ProcessedImage, RESIZE_TO_FIT, ResizeParams,
    S3Destination, SaveOptions,
};
use crate::external::image_processor::ImageProcessorClient;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::types::JobArgs;
use crate::jobs::worker::{Task, TaskContext, Worker, parse_arg, require_arg};

pub const WORKER_NAME: &str = "image_resize";

const DEFAULT_EXTENSION: &str = ".jpg";

/// Lower bound applied to `ImageResizeConfig::poll_interval`.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct ImageResizeConfig {
    pub submit_url: String,
    pub poll_url: String,
    pub application_id: String,
    pub api_version: String,
    pub bucket: String,
    /// Default callback when a job does not name its own.
    pub callback_url: String,
    /// Poll the provider instead of asking it to call back.
    pub poll_mode: bool,
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl ImageResizeConfig {
    fn clamped(mut self) -> Self {
        if self.poll_interval < MIN_POLL_INTERVAL {
            tracing::warn!(poll_interval = ?self.poll_interval, min = ?MIN_POLL_INTERVAL, "Poll interval too small, clamping");
            self.poll_interval = MIN_POLL_INTERVAL;
        }
        self
    }
}

impl Default for ImageResizeConfig {
    fn default() -> Self {
        Self {
            submit_url: String::new(),
            poll_url: String::new(),
            application_id: String::new(),
            api_version: "1.22".to_string(),
            bucket: String::new(),
            callback_url: String::new(),
            poll_mode: false,
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(300),
        }
    }
}

/// Typed arguments of an `image_resize` job.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ResizeArgs {
    #[validate(url(message = "src must be a URL"))]
    pub src: String,
    #[validate(length(min = 1, max = 1024, message = "key must be 1-1024 characters"))]
    pub key: String,
    #[validate(range(min = 1, max = 10000, message = "width must be 1-10000"))]
    pub width: u32,
    #[validate(range(min = 1, max = 10000, message = "height must be 1-10000"))]
    pub height: u32,
    #[validate(length(min = 1, max = 1024, message = "image_identifier must be 1-1024 characters"))]
    pub image_identifier: String,
    #[validate(url(message = "callback_url must be a URL"))]
    pub callback_url: String,
}

impl ResizeArgs {
    /// Reads `src`, `key`, `width`, `height` and the optional
    /// `image_identifier` / `callback_url` overrides.
    pub fn from_job_args(args: &JobArgs, default_callback: &str) -> JobResult<Self> {
        let key = require_arg(args, "key")?.to_string();
        let image_identifier = optional_arg(args, "image_identifier").unwrap_or(&key).to_string();
        let callback_url = optional_arg(args, "callback_url")
            .unwrap_or(default_callback)
            .to_string();

        let parsed = Self {
            src: require_arg(args, "src")?.to_string(),
            width: parse_arg(args, "width")?,
            height: parse_arg(args, "height")?,
            key,
            image_identifier,
            callback_url,
        };
        parsed
            .validate()
            .map_err(|e| JobError::InvalidArgs(e.to_string()))?;
        Ok(parsed)
    }

    /// File extension of the destination key, with the leading dot.
    pub fn extension(&self) -> String {
        Path::new(&self.key)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }
}

/// Images listed in a completion document. The body itself is forwarded
/// untouched, so an unexpected shape only loses the log lines.
fn completed_images(body: &str) -> Vec<ProcessedImage> {
    match serde_json::from_str::<PollResponse>(body) {
        Ok(done) => done.results.images,
        Err(e) => {
            tracing::debug!(error = %e, "Completion document has no image list");
            Vec::new()
        }
    }
}

fn optional_arg<'a>(args: &'a JobArgs, key: &str) -> Option<&'a str> {
    args.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Worker registered under [`WORKER_NAME`].
#[derive(Debug, Clone)]
pub struct ImageResizeWorker {
    config: Arc<ImageResizeConfig>,
    client: ImageProcessorClient,
}

impl ImageResizeWorker {
    pub fn new(config: ImageResizeConfig) -> Self {
        let config = config.clamped();
        let client = ImageProcessorClient::new(&config.submit_url, &config.poll_url);
        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn with_client(config: ImageResizeConfig, http: reqwest::Client) -> Self {
        let config = config.clamped();
        let client = ImageProcessorClient::with_client(http, &config.submit_url, &config.poll_url);
        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn config(&self) -> &ImageResizeConfig {
        &self.config
    }
}

impl Worker for ImageResizeWorker {
    fn spawn(&self, args: JobArgs) -> JobResult<Box<dyn Task>> {
        let args = ResizeArgs::from_job_args(&args, &self.config.callback_url)?;
        Ok(Box::new(ImageResizeTask {
            config: Arc::clone(&self.config),
            client: self.client.clone(),
            args,
        }))
    }
}

#[derive(Debug)]
pub struct ImageResizeTask {
    config: Arc<ImageResizeConfig>,
    client: ImageProcessorClient,
    args: ResizeArgs,
}

impl ImageResizeTask {
    pub fn args(&self) -> &ResizeArgs {
        &self.args
    }

    /// The provider job description. `postback_url` is set only outside poll mode.
    pub fn submission(&self) -> JobSubmission {
        let postback_url = (!self.config.poll_mode).then(|| self.args.callback_url.clone());
        JobSubmission {
            application_id: self.config.application_id.clone(),
            src: self.args.src.clone(),
            v: self.config.api_version.clone(),
            postback_url,
            functions: vec![ImageFunction {
                name: RESIZE_TO_FIT.to_string(),
                params: ResizeParams {
                    width: self.args.width,
                    height: self.args.height,
                },
                save: SaveOptions {
                    extension: self.args.extension(),
                    image_identifier: self.args.image_identifier.clone(),
                    s3_destination: S3Destination {
                        key: self.args.key.clone(),
                        bucket: self.config.bucket.clone(),
                    },
                },
            }],
        }
    }

    /// Poll until the provider reports success or the deadline passes.
    ///
    /// The deadline also interrupts a poll request that is still in flight.
    async fn poll_until_complete(&self, provider_job_id: &str, deadline_at: Instant) -> JobResult<()> {
        let deadline = tokio::time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_error: Option<String> = None;
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break,
                _ = ticker.tick() => {}
            }

            attempts += 1;
            let polled = tokio::select! {
                biased;
                _ = &mut deadline => break,
                polled = self.client.poll(provider_job_id) => polled,
            };

            match polled {
                Ok(body) => {
                    tracing::info!(provider_job_id, attempts, "Provider job complete, forwarding result");
                    for image in completed_images(&body) {
                        tracing::info!(
                            provider_job_id,
                            image_identifier = %image.image_identifier,
                            s3_url = %image.s3_url,
                            "Resized image stored"
                        );
                    }
                    return self.client.forward(&self.args.callback_url, body).await;
                }
                Err(e) => {
                    tracing::debug!(provider_job_id, attempts, error = %e, "Provider job not ready");
                    last_error = Some(e.to_string());
                }
            }
        }

        tracing::warn!(provider_job_id, attempts, deadline = ?self.config.deadline, "Polling deadline exceeded");
        Err(JobError::DeadlineExceeded {
            deadline: self.config.deadline,
            last_error: last_error.unwrap_or_else(|| "none".to_string()),
        })
    }
}

#[async_trait]
impl Task for ImageResizeTask {
    async fn run(&self, ctx: TaskContext) -> JobResult<()> {
        let deadline_at = Instant::now() + self.config.deadline;
        let submission = self.submission();

        tracing::info!(
            job_id = ctx.job_id,
            src = %self.args.src,
            key = %self.args.key,
            poll_mode = self.config.poll_mode,
            "Submitting image resize"
        );
        let response = self.client.submit(&submission).await?;

        if !self.config.poll_mode {
            return Ok(());
        }

        let provider_job_id = response.job_id().ok_or_else(|| {
            JobError::Execution("submission response did not include results.job_id".to_string())
        })?;
        self.poll_until_complete(provider_job_id, deadline_at).await
    }
}
