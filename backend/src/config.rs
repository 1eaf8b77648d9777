use crate::services::analysis_service::Analyzer;
use crate::services::feature_service::FeatureSet;
use crate::services::sentiment_service::InferenceEngine;
use crate::services::youtube_service::{YouTubeClient, MAX_COMMENTS_PER_PAGE};
use crate::AppState;
use anyhow::{Context, Result};
use env_logger::Builder;
use lazy_static::lazy_static;
use log::{info, LevelFilter};
use rocket::http::Method;
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    pub static ref YOUTUBE_API_KEY: Option<String> =
        env::var("YOUTUBE_API_KEY").ok().filter(|key| !key.trim().is_empty());
    pub static ref YOUTUBE_API_BASE: String = env::var("YOUTUBE_API_BASE")
        .unwrap_or_else(|_| "https://www.googleapis.com/youtube/v3".to_string());
    pub static ref SENTIMENT_MODEL_PATH: PathBuf = env::var("SENTIMENT_MODEL_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./sentiment_model"));
    pub static ref FEATURE_KEYWORDS_PATH: Option<PathBuf> =
        env::var("FEATURE_KEYWORDS_PATH").ok().map(PathBuf::from);
    pub static ref MAX_COMMENTS: u32 =
        parse_or(env::var("MAX_COMMENTS").ok(), 100).clamp(1, MAX_COMMENTS_PER_PAGE);
    pub static ref CLASSIFY_BATCH_SIZE: usize =
        parse_or(env::var("CLASSIFY_BATCH_SIZE").ok(), 1).max(1);
    pub static ref HTTP_TIMEOUT_SECS: u64 = timeout_secs(env::var("HTTP_TIMEOUT_SECS").ok());
    pub static ref CORS_ALLOWED_ORIGINS: Option<Vec<String>> = env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|origins| parse_origins(&origins))
        .filter(|origins| !origins.is_empty());
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn timeout_secs(value: Option<String>) -> u64 {
    parse_or(value, 30).max(1)
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

pub fn init_logger() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
    info!("Starting sentiment backend...");
}

pub fn load_environment() {
    dotenv::dotenv().ok();
}

pub fn load_feature_set() -> Result<FeatureSet> {
    let features = match &*FEATURE_KEYWORDS_PATH {
        Some(path) => FeatureSet::from_json_file(path)?,
        None => FeatureSet::default(),
    };
    info!("Tracking features: {}", features.names().join(", "));
    Ok(features)
}

pub fn create_app_state() -> Result<AppState> {
    let api_key = YOUTUBE_API_KEY
        .clone()
        .context("YOUTUBE_API_KEY environment variable must be set")?;
    let source = YouTubeClient::new(
        api_key,
        &YOUTUBE_API_BASE,
        Duration::from_secs(*HTTP_TIMEOUT_SECS),
    )?;
    info!("Using YouTube Data API at: {}", &*YOUTUBE_API_BASE);

    let features = load_feature_set()?;
    let engine = InferenceEngine::load(&SENTIMENT_MODEL_PATH)?;

    info!(
        "Fetching up to {} comments per video, classifying in batches of {}",
        *MAX_COMMENTS, *CLASSIFY_BATCH_SIZE
    );

    Ok(AppState {
        analyzer: Analyzer {
            source: Arc::new(source),
            classifier: Arc::new(engine),
            features: Arc::new(features),
            comment_limit: *MAX_COMMENTS,
            batch_size: *CLASSIFY_BATCH_SIZE,
        },
    })
}

pub fn create_cors() -> Result<rocket_cors::Cors> {
    let allowed_origins = match &*CORS_ALLOWED_ORIGINS {
        Some(origins) => AllowedOrigins::some_exact(origins.as_slice()),
        None => AllowedOrigins::all(),
    };

    let cors = CorsOptions::default()
        .allowed_origins(allowed_origins)
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::some(&["Accept", "Content-Type"]))
        .to_cors()
        .map_err(|e| anyhow::anyhow!("Failed to create CORS options: {}", e))?;

    Ok(cors)
}
