pub mod analysis_service;
pub mod feature_service;
pub mod sentiment_service;
pub mod youtube_service;
