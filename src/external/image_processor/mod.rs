//! Client for the external image-processing provider.
//!
//! Submissions are POSTed as a JSON job description; completion arrives either
//! as a postback from the provider or by polling `{poll_url}/{job_id}`.

pub mod client;
pub mod types;

pub use client::ImageProcessorClient;
pub use types::{
    ImageFunction, JobSubmission, PollResponse, PollResults, ProcessedImage, ResizeParams,
    S3Destination, SaveOptions, SubmissionResponse, SubmissionResults,
};
