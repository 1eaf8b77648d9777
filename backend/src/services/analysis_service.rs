use crate::error::{AnalysisError, Result};
use crate::models::{AnalysisResult, CommentRecord, FeatureMap, SentimentLabel, SentimentSummary};
use crate::services::feature_service::FeatureSet;
use crate::services::sentiment_service::SentimentClassifier;
use crate::services::youtube_service::VideoSource;
use crate::utils::extract_youtube_video_id;
use log::{error, info};
use std::sync::Arc;

/// Everything a single analysis needs, shared across requests.
#[derive(Clone)]
pub struct Analyzer {
    pub source: Arc<dyn VideoSource>,
    pub classifier: Arc<dyn SentimentClassifier>,
    pub features: Arc<FeatureSet>,
    pub comment_limit: u32,
    pub batch_size: usize,
}

impl Analyzer {
    pub async fn analyze(&self, url: &str) -> Result<AnalysisResult> {
        let video_id = extract_youtube_video_id(url).ok_or(AnalysisError::InvalidUrl)?;
        info!("Analyzing video ID: {video_id}");

        let (video_details, comments) = tokio::try_join!(
            self.source.fetch_video_metadata(&video_id),
            self.source.fetch_comments(&video_id, self.comment_limit),
        )?;

        if comments.is_empty() {
            info!("No comments found for video ID: {video_id}");
            return Err(AnalysisError::NoComments);
        }

        let labels = self.classify(&comments).await?;
        let records = build_records(comments, labels, &self.features);
        let (sentiment_summary, feature_analysis) = aggregate(&records, &self.features);

        info!(
            "Video {video_id}: {} comments, {} positive, {} neutral, {} negative",
            records.len(),
            sentiment_summary.positive,
            sentiment_summary.neutral,
            sentiment_summary.negative
        );

        Ok(AnalysisResult {
            video_details,
            sentiment_summary,
            feature_analysis,
            total_comments: records.len(),
            comments: records,
        })
    }

    /// Runs the classifier on the blocking pool; labels come back in input order.
    async fn classify(&self, comments: &[String]) -> Result<Vec<SentimentLabel>> {
        let classifier = Arc::clone(&self.classifier);
        let texts = comments.to_vec();
        let batch_size = self.batch_size.max(1);

        let labels = tokio::task::spawn_blocking(move || {
            let mut labels = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                labels.extend(classifier.classify_batch(chunk)?);
            }
            Ok::<_, AnalysisError>(labels)
        })
        .await
        .map_err(|e| AnalysisError::Inference(format!("classification task failed: {e}")))?;

        let labels = labels.inspect_err(|e| error!("Sentiment classification failed: {e}"))?;
        if labels.len() != comments.len() {
            return Err(AnalysisError::Inference(format!(
                "expected {} labels, got {}",
                comments.len(),
                labels.len()
            )));
        }
        Ok(labels)
    }
}

pub fn build_records(
    comments: Vec<String>,
    labels: Vec<SentimentLabel>,
    features: &FeatureSet,
) -> Vec<CommentRecord> {
    comments
        .into_iter()
        .zip(labels)
        .map(|(comment, sentiment)| CommentRecord {
            features: features.tag(&comment),
            comment,
            sentiment,
        })
        .collect()
}

/// Counts labels and nets feature mentions: +1 per positive mention, -1 per negative.
pub fn aggregate(
    records: &[CommentRecord],
    features: &FeatureSet,
) -> (SentimentSummary, FeatureMap<i64>) {
    let mut summary = SentimentSummary::default();
    let mut scores: Vec<(String, i64)> = features.names().into_iter().map(|n| (n, 0)).collect();

    for record in records {
        summary.record(record.sentiment);

        let delta = match record.sentiment {
            SentimentLabel::Positive => 1,
            SentimentLabel::Negative => -1,
            SentimentLabel::Neutral => continue,
        };
        for (feature, score) in scores.iter_mut() {
            if record.features.get(feature) == Some(&1) {
                *score += delta;
            }
        }
    }

    (summary, FeatureMap::new(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VideoMetadata;
    use std::sync::Mutex;

    struct FakeSource {
        metadata: Option<VideoMetadata>,
        comments: Vec<String>,
        requested: Mutex<Vec<(String, u32)>>,
    }

    impl FakeSource {
        fn new(metadata: Option<VideoMetadata>, comments: &[&str]) -> Self {
            FakeSource {
                metadata,
                comments: comments.iter().map(|c| c.to_string()).collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[rocket::async_trait]
    impl VideoSource for FakeSource {
        async fn fetch_video_metadata(&self, _video_id: &str) -> Result<Option<VideoMetadata>> {
            Ok(self.metadata.clone())
        }

        async fn fetch_comments(&self, video_id: &str, limit: u32) -> Result<Vec<String>> {
            self.requested.lock().unwrap().push((video_id.to_string(), limit));
            Ok(self.comments.clone())
        }
    }

    struct FailingSource;

    #[rocket::async_trait]
    impl VideoSource for FailingSource {
        async fn fetch_video_metadata(&self, _video_id: &str) -> Result<Option<VideoMetadata>> {
            Ok(None)
        }

        async fn fetch_comments(&self, _video_id: &str, _limit: u32) -> Result<Vec<String>> {
            Err(AnalysisError::UpstreamUnavailable("HTTP 403 Forbidden: quota".to_string()))
        }
    }

    /// "good" is positive, "bad" is negative, anything else neutral.
    struct KeywordClassifier;

    impl SentimentClassifier for KeywordClassifier {
        fn classify(&self, text: &str) -> Result<SentimentLabel> {
            let text = text.to_lowercase();
            Ok(if text.contains("good") {
                SentimentLabel::Positive
            } else if text.contains("bad") {
                SentimentLabel::Negative
            } else {
                SentimentLabel::Neutral
            })
        }
    }

    struct BrokenClassifier;

    impl SentimentClassifier for BrokenClassifier {
        fn classify(&self, _text: &str) -> Result<SentimentLabel> {
            Err(AnalysisError::Inference("device lost".to_string()))
        }
    }

    fn analyzer(source: impl VideoSource + 'static, batch_size: usize) -> Analyzer {
        Analyzer {
            source: Arc::new(source),
            classifier: Arc::new(KeywordClassifier),
            features: Arc::new(FeatureSet::default()),
            comment_limit: 100,
            batch_size,
        }
    }

    fn record(text: &str, sentiment: SentimentLabel) -> CommentRecord {
        CommentRecord {
            comment: text.to_string(),
            sentiment,
            features: FeatureSet::default().tag(text),
        }
    }

    const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[test]
    fn positive_and_negative_mentions_cancel_out() {
        let features = FeatureSet::default();
        let records = vec![
            record("battery lasts forever", SentimentLabel::Positive),
            record("battery died in an hour", SentimentLabel::Negative),
            record("first", SentimentLabel::Neutral),
        ];

        let (summary, scores) = aggregate(&records, &features);
        assert_eq!(
            summary,
            SentimentSummary {
                positive: 1,
                neutral: 1,
                negative: 1
            }
        );
        assert_eq!(scores.get("battery"), Some(&0));
        assert_eq!(scores.get("camera"), Some(&0));
        assert_eq!(scores.get("performance"), Some(&0));
        assert_eq!(scores.get("display"), Some(&0));
    }

    #[test]
    fn neutral_mentions_do_not_score() {
        let features = FeatureSet::default();
        let records = vec![
            record("camera and screen", SentimentLabel::Neutral),
            record("camera is ok", SentimentLabel::Positive),
            record("camera again", SentimentLabel::Positive),
            record("screen flickers", SentimentLabel::Negative),
        ];

        let (_, scores) = aggregate(&records, &features);
        assert_eq!(scores.get("camera"), Some(&2));
        assert_eq!(scores.get("display"), Some(&-1));
        assert_eq!(scores.iter().count(), 4);
    }

    #[test]
    fn aggregation_ignores_comment_order() {
        let features = FeatureSet::default();
        let mut records = vec![
            record("camera lag", SentimentLabel::Negative),
            record("battery and display", SentimentLabel::Positive),
            record("gaming speed", SentimentLabel::Positive),
            record("nothing", SentimentLabel::Neutral),
            record("lens", SentimentLabel::Negative),
        ];

        let forward = aggregate(&records, &features);
        records.reverse();
        let reversed = aggregate(&records, &features);
        records.rotate_left(2);
        let rotated = aggregate(&records, &features);

        assert_eq!(forward, reversed);
        assert_eq!(forward, rotated);
    }

    #[test]
    fn empty_batch_reports_all_features_at_zero() {
        let features = FeatureSet::default();
        let (summary, scores) = aggregate(&[], &features);
        assert_eq!(summary.total(), 0);
        assert_eq!(scores.iter().count(), 4);
        assert!(scores.iter().all(|(_, score)| *score == 0));
    }

    #[rocket::async_test]
    async fn analyzes_comments_end_to_end() {
        let source = FakeSource::new(
            Some(VideoMetadata {
                title: "Phone review".to_string(),
                ..Default::default()
            }),
            &["good battery", "bad battery", "first"],
        );
        let result = analyzer(source, 1).analyze(WATCH_URL).await.unwrap();

        assert_eq!(result.total_comments, 3);
        assert_eq!(result.sentiment_summary.total(), result.total_comments);
        assert_eq!(result.sentiment_summary.positive, 1);
        assert_eq!(result.sentiment_summary.neutral, 1);
        assert_eq!(result.sentiment_summary.negative, 1);
        assert_eq!(result.feature_analysis.get("battery"), Some(&0));
        assert_eq!(result.video_details.unwrap().title, "Phone review");

        let texts: Vec<&str> = result.comments.iter().map(|c| c.comment.as_str()).collect();
        assert_eq!(texts, vec!["good battery", "bad battery", "first"]);
        assert_eq!(result.comments[0].features.get("battery"), Some(&1));
        assert_eq!(result.comments[2].features.get("battery"), Some(&0));
    }

    #[rocket::async_test]
    async fn batch_size_does_not_change_results() {
        let comments = [
            "good camera",
            "bad lag",
            "good screen",
            "meh",
            "bad battery",
            "good good",
            "bad display, good camera",
        ];

        let mut outputs = Vec::new();
        for batch_size in [1, 2, 3, 16] {
            let result = analyzer(FakeSource::new(None, &comments), batch_size)
                .analyze(WATCH_URL)
                .await
                .unwrap();
            outputs.push(serde_json::to_value(&result).unwrap());
        }
        assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[rocket::async_test]
    async fn repeated_runs_are_identical() {
        let comments = ["good camera", "bad lag", "nothing here"];
        let analyzer = analyzer(FakeSource::new(None, &comments), 4);
        let first = serde_json::to_value(analyzer.analyze(WATCH_URL).await.unwrap()).unwrap();
        let second = serde_json::to_value(analyzer.analyze(WATCH_URL).await.unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[rocket::async_test]
    async fn passes_resolved_id_and_limit_to_source() {
        let source = Arc::new(FakeSource::new(None, &["good"]));
        let analyzer = Analyzer {
            source: source.clone(),
            classifier: Arc::new(KeywordClassifier),
            features: Arc::new(FeatureSet::default()),
            comment_limit: 25,
            batch_size: 1,
        };
        analyzer.analyze("https://youtu.be/abcdefghijk?si=x").await.unwrap();
        assert_eq!(
            *source.requested.lock().unwrap(),
            vec![("abcdefghijk".to_string(), 25)]
        );
    }

    #[rocket::async_test]
    async fn invalid_url_is_rejected_before_fetching() {
        let source = Arc::new(FakeSource::new(None, &["good"]));
        let analyzer = Analyzer {
            source: source.clone(),
            classifier: Arc::new(KeywordClassifier),
            features: Arc::new(FeatureSet::default()),
            comment_limit: 100,
            batch_size: 1,
        };
        let result = analyzer.analyze("https://example.com").await;
        assert!(matches!(result, Err(AnalysisError::InvalidUrl)));
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn no_comments_is_an_error_even_with_metadata() {
        let with_metadata = FakeSource::new(Some(VideoMetadata::default()), &[]);
        let result = analyzer(with_metadata, 1).analyze(WATCH_URL).await;
        assert!(matches!(result, Err(AnalysisError::NoComments)));

        let without_metadata = FakeSource::new(None, &[]);
        let result = analyzer(without_metadata, 1).analyze(WATCH_URL).await;
        assert!(matches!(result, Err(AnalysisError::NoComments)));
    }

    #[rocket::async_test]
    async fn upstream_failure_fails_the_request() {
        let result = analyzer(FailingSource, 1).analyze(WATCH_URL).await;
        assert!(matches!(result, Err(AnalysisError::UpstreamUnavailable(_))));
    }

    #[rocket::async_test]
    async fn classifier_failure_fails_the_request() {
        let analyzer = Analyzer {
            source: Arc::new(FakeSource::new(None, &["good"])),
            classifier: Arc::new(BrokenClassifier),
            features: Arc::new(FeatureSet::default()),
            comment_limit: 100,
            batch_size: 1,
        };
        let result = analyzer.analyze(WATCH_URL).await;
        assert!(matches!(result, Err(AnalysisError::Inference(_))));
    }
}
