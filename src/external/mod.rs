//! Outbound HTTP integrations.

pub mod client;
pub mod image_processor;

pub use client::HTTP_CLIENT;
