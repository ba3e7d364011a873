//! External collaborators
//!
//! Remote ML inference, nutrition lookup, blob storage and email. Each is a
//! trait with a concrete client, so services can be driven by fakes in tests.

pub mod inference;
pub mod lookup;
pub mod mailer;
pub mod retry;
pub mod storage;

use serde::de::DeserializeOwned;
use thiserror::Error;

pub use inference::{
    DetectedFood, ExerciseRecommendation, ExerciseRequest, InferenceService, MlApiClient,
    RecommendedFood, RiskPrediction, RiskPredictionRequest,
};
pub use lookup::{FoodDataCentralClient, NutritionLookup};
pub use mailer::{LogMailer, Mailer, MailgunMailer};
pub use retry::RetryPolicy;
pub use storage::{generate_file_name, BlobStore, LocalBlobStore, StorageError};

/// Longest response body kept in an error
const MAX_ERROR_BODY: usize = 512;

/// Failure talking to a remote service
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {message}")]
    Transport { service: &'static str, message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unreadable response: {message}")]
    Decode { service: &'static str, message: String },

    #[error("{service} has no result for '{query}'")]
    NoResult { service: &'static str, query: String },

    #[error("{service} returned an invalid value: {message}")]
    InvalidResponse { service: &'static str, message: String },
}

impl UpstreamError {
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        UpstreamError::Transport {
            service,
            message: err.to_string(),
        }
    }

    /// Transport failures, 5xx and 429 are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport { .. } => true,
            UpstreamError::Status { status, .. } => *status >= 500 || *status == 429,
            UpstreamError::Decode { .. }
            | UpstreamError::NoResult { .. }
            | UpstreamError::InvalidResponse { .. } => false,
        }
    }
}

/// Read a response body, failing on non-2xx statuses
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<T, UpstreamError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| UpstreamError::transport(service, e))?;

    if !status.is_success() {
        let mut body = body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| UpstreamError::Decode {
        service,
        message: e.to_string(),
    })
}
