use crate::error::{AnalysisError, Result};
use crate::models::VideoMetadata;
use crate::utils::parse_counter;
use log::{error, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

/// The commentThreads endpoint accepts at most this many results per page.
pub const MAX_COMMENTS_PER_PAGE: u32 = 100;

// commentThreads errors that mean "nothing to analyze" rather than an outage.
const NO_COMMENT_REASONS: &[(StatusCode, &str)] = &[
    (StatusCode::FORBIDDEN, "commentsDisabled"),
    (StatusCode::NOT_FOUND, "videoNotFound"),
];

/// Source of video metadata and top-level comments.
#[rocket::async_trait]
pub trait VideoSource: Send + Sync {
    /// `Ok(None)` when the video does not exist.
    async fn fetch_video_metadata(&self, video_id: &str) -> Result<Option<VideoMetadata>>;

    async fn fetch_comments(&self, video_id: &str, limit: u32) -> Result<Vec<String>>;
}

/// Client for the YouTube Data API v3.
pub struct YouTubeClient {
    client: Client,
    api_key: String,
    api_base: String,
}

impl YouTubeClient {
    pub fn new(api_key: String, api_base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, api_key, api_base)
    }

    fn with_client(client: Client, api_key: String, api_base: &str) -> anyhow::Result<Self> {
        let parsed = Url::parse(api_base)
            .map_err(|e| anyhow::anyhow!("Invalid YouTube API base URL '{api_base}': {e}"))?;

        Ok(YouTubeClient {
            client,
            api_key,
            api_base: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("key", self.api_key.as_str()));
        Url::parse_with_params(&format!("{}/{path}", self.api_base), &query)
            .map_err(|e| AnalysisError::UpstreamUnavailable(format!("invalid request URL: {e}")))
    }

    async fn get(&self, url: Url) -> Result<(StatusCode, String)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[rocket::async_trait]
impl VideoSource for YouTubeClient {
    async fn fetch_video_metadata(&self, video_id: &str) -> Result<Option<VideoMetadata>> {
        // Documentation: https://developers.google.com/youtube/v3/docs/videos
        let url = self.endpoint("videos", &[("part", "snippet,statistics"), ("id", video_id)])?;
        let (status, body) = self.get(url).await?;
        video_metadata_outcome(video_id, status, &body)
    }

    async fn fetch_comments(&self, video_id: &str, limit: u32) -> Result<Vec<String>> {
        // Documentation: https://developers.google.com/youtube/v3/docs/commentThreads
        let max_results = limit.clamp(1, MAX_COMMENTS_PER_PAGE).to_string();
        let url = self.endpoint(
            "commentThreads",
            &[
                ("part", "snippet"),
                ("videoId", video_id),
                ("maxResults", max_results.as_str()),
            ],
        )?;
        let (status, body) = self.get(url).await?;
        comments_outcome(video_id, status, &body)
    }
}

/// Any non-2xx answer from `videos` fails the request.
fn video_metadata_outcome(
    video_id: &str,
    status: StatusCode,
    body: &str,
) -> Result<Option<VideoMetadata>> {
    if !status.is_success() {
        let failure = describe_api_error(status, body);
        error!("Video metadata request for {video_id} failed: {failure}");
        return Err(AnalysisError::UpstreamUnavailable(failure));
    }

    let metadata = parse_video_response(body)?;
    if metadata.is_none() {
        warn!("No video metadata returned for {video_id}");
    }
    Ok(metadata)
}

/// Disabled comments and unknown videos yield no comments; other non-2xx answers fail.
fn comments_outcome(video_id: &str, status: StatusCode, body: &str) -> Result<Vec<String>> {
    if let Some((_, reason)) = NO_COMMENT_REASONS
        .iter()
        .find(|(code, reason)| status == *code && has_error_reason(body, reason))
    {
        info!("No comments available for {video_id}: {reason}");
        return Ok(Vec::new());
    }
    if !status.is_success() {
        let failure = describe_api_error(status, body);
        error!("Comment request for {video_id} failed: {failure}");
        return Err(AnalysisError::UpstreamUnavailable(failure));
    }

    let comments = parse_comment_threads(body)?;
    info!("Fetched {} comments for video ID: {video_id}", comments.len());
    Ok(comments)
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_title: String,
    #[serde(default)]
    description: String,
    published_at: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default, deserialize_with = "counter")]
    view_count: u64,
    #[serde(default, deserialize_with = "counter")]
    like_count: u64,
    #[serde(default, deserialize_with = "counter")]
    comment_count: u64,
}

// Counters arrive as decimal strings; plain numbers are accepted too.
fn counter<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => parse_counter(Some(&s)),
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    })
}

#[derive(Debug, Deserialize)]
struct CommentThreadListResponse {
    #[serde(default)]
    items: Vec<CommentThread>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    text_display: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

pub(crate) fn parse_video_response(body: &str) -> Result<Option<VideoMetadata>> {
    let response: VideoListResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::Parse {
            endpoint: "videos",
            reason: e.to_string(),
        })?;

    Ok(response.items.into_iter().next().map(|item| VideoMetadata {
        title: item.snippet.title,
        channel_title: item.snippet.channel_title,
        description: item.snippet.description,
        published_at: item.snippet.published_at,
        views: item.statistics.view_count,
        likes: item.statistics.like_count,
        comments: item.statistics.comment_count,
    }))
}

pub(crate) fn parse_comment_threads(body: &str) -> Result<Vec<String>> {
    let response: CommentThreadListResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::Parse {
            endpoint: "commentThreads",
            reason: e.to_string(),
        })?;

    Ok(response
        .items
        .into_iter()
        .map(|thread| thread.snippet.top_level_comment.snippet.text_display)
        .collect())
}

fn has_error_reason(body: &str, reason: &str) -> bool {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|response| response.error.errors.iter().any(|e| e.reason == reason))
        .unwrap_or(false)
}

fn describe_api_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(response) if !response.error.message.is_empty() => {
            format!("HTTP {status}: {}", response.error.message)
        }
        _ => format!("HTTP {status}"),
    }
}
