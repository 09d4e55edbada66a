use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One upload as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    #[serde(rename = "channel")]
    pub channel_name: String,
    pub title: String,
    #[serde(rename = "id")]
    pub video_id: String,
    #[serde(rename = "thumbnailURL")]
    pub thumbnail_url: String,
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,
    #[serde(rename = "videoURL")]
    pub video_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_wire_field_names() {
        let video = VideoRecord {
            channel_name: "Rust".into(),
            title: "RustConf keynote".into(),
            video_id: "abc123".into(),
            thumbnail_url: "https://i.ytimg.com/vi/abc123/hqdefault.jpg".into(),
            published_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap(),
            video_url: "https://www.youtube.com/watch?v=abc123".into(),
        };

        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["channel"], "Rust");
        assert_eq!(json["id"], "abc123");
        assert_eq!(json["thumbnailURL"], video.thumbnail_url);
        assert_eq!(json["videoURL"], video.video_url);
        assert_eq!(json["publishedAt"], "2026-03-01T12:30:00Z");
    }
}
