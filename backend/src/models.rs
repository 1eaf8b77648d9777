use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::Responder;
use rocket::{response, Response};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Maps a classifier output index to its label: 0 Negative, 1 Neutral, 2 Positive.
    pub fn from_class_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(SentimentLabel::Negative),
            1 => Some(SentimentLabel::Neutral),
            2 => Some(SentimentLabel::Positive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Negative => "Negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub channel_title: String,
    pub description: String,
    pub published_at: String, // ISO 8601, as sent by YouTube
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// Feature name to value, kept in the configured feature order.
/// Serializes as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMap<T>(Vec<(String, T)>);

impl<T> FeatureMap<T> {
    pub fn new(entries: Vec<(String, T)>) -> Self {
        FeatureMap(entries)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.0
            .iter()
            .find(|(feature, _)| feature == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(feature, value)| (feature.as_str(), value))
    }
}

impl<T: Serialize> Serialize for FeatureMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (feature, value) in &self.0 {
            map.serialize_entry(feature, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRecord {
    pub comment: String,
    pub sentiment: SentimentLabel,
    #[serde(flatten)]
    pub features: FeatureMap<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentSummary {
    #[serde(rename = "Positive")]
    pub positive: usize,
    #[serde(rename = "Neutral")]
    pub neutral: usize,
    #[serde(rename = "Negative")]
    pub negative: usize,
}

impl SentimentSummary {
    pub fn record(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub video_details: Option<VideoMetadata>,
    pub sentiment_summary: SentimentSummary,
    pub feature_analysis: FeatureMap<i64>,
    pub total_comments: usize,
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default, deserialize_with = "string_or_none")]
    pub url: Option<String>,
}

// Anything other than a JSON string ends up as None and is reported as an invalid URL.
fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(url) => Some(url),
        _ => None,
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub features: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: Status,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_comments: Option<usize>,
}

impl ErrorResponse {
    pub fn new(status: Status, error: impl Into<String>) -> Self {
        ErrorResponse {
            status,
            error: error.into(),
            details: None,
            total_comments: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_total_comments(mut self, total_comments: usize) -> Self {
        self.total_comments = Some(total_comments);
        self
    }
}

impl<'r> Responder<'r, 'static> for ErrorResponse {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let json = serde_json::to_string(&self).map_err(|_| Status::InternalServerError)?;
        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}
