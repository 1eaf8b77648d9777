use crate::error::AnalysisError;
use crate::models::{AnalysisResult, AnalyzeRequest, ErrorResponse, HealthResponse};
use crate::AppState;
use log::{error, warn};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{catch, get, post, Request, State};

#[post("/analyze", data = "<request>")]
pub async fn analyze_video(
    state: &State<AppState>,
    request: Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    let url = request.into_inner().url.unwrap_or_default();

    match state.analyzer.analyze(&url).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            match &e {
                AnalysisError::InvalidUrl | AnalysisError::NoComments => {
                    warn!("Analysis of '{url}' rejected: {e}")
                }
                _ => error!("Analysis of '{url}' failed: {e}"),
            }
            Err(e)
        }
    }
}

#[get("/health")]
pub fn health(state: &State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        features: state.analyzer.features.names(),
    })
}

#[catch(default)]
pub fn default_catcher(status: Status, _request: &Request) -> ErrorResponse {
    ErrorResponse::new(status, status.reason().unwrap_or("Unknown error"))
}
