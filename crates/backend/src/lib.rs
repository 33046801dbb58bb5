#![forbid(unsafe_code)]

pub mod client;
pub mod http;

pub use client::{
    AssessmentBackend, BackendError, InMemoryBackend, Submission, SubmissionReceipt,
};
pub use http::{HttpBackend, HttpConfig};
