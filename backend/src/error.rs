use crate::models::ErrorResponse;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid YouTube URL")]
    InvalidUrl,

    #[error("No comments found")]
    NoComments,

    #[error("YouTube API request failed: {0}")]
    UpstreamUnavailable(String),

    #[error("Unexpected YouTube API response for {endpoint}: {reason}")]
    Parse { endpoint: &'static str, reason: String },

    #[error("Sentiment classification failed: {0}")]
    Inference(String),

    #[error("Sentiment model unavailable at {path}: {reason}")]
    ModelUnavailable { path: PathBuf, reason: String },
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key.
        AnalysisError::UpstreamUnavailable(e.without_url().to_string())
    }
}

impl From<candle_core::Error> for AnalysisError {
    fn from(e: candle_core::Error) -> Self {
        AnalysisError::Inference(e.to_string())
    }
}

impl AnalysisError {
    pub fn status(&self) -> Status {
        match self {
            AnalysisError::InvalidUrl => Status::BadRequest,
            AnalysisError::NoComments => Status::NotFound,
            AnalysisError::UpstreamUnavailable(_) | AnalysisError::Parse { .. } => {
                Status::BadGateway
            }
            AnalysisError::Inference(_) | AnalysisError::ModelUnavailable { .. } => {
                Status::InternalServerError
            }
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let status = self.status();
        match self {
            AnalysisError::InvalidUrl => ErrorResponse::new(status, "Invalid YouTube URL"),
            AnalysisError::NoComments => {
                ErrorResponse::new(status, "No comments found").with_total_comments(0)
            }
            AnalysisError::UpstreamUnavailable(_) | AnalysisError::Parse { .. } => {
                ErrorResponse::new(status, "YouTube API request failed")
                    .with_details(self.to_string())
            }
            AnalysisError::Inference(_) | AnalysisError::ModelUnavailable { .. } => {
                ErrorResponse::new(status, "Sentiment classification failed")
                    .with_details(self.to_string())
            }
        }
    }
}

impl<'r> Responder<'r, 'static> for AnalysisError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        self.to_response().respond_to(request)
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
