use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use super::resolver::ResolveError;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Candidato devuelto por la búsqueda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    pub id: String,
    pub title: String,
}

/// Recurso de `videos`. `title` solo viene con `part=snippet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoResource {
    pub id: String,
    pub title: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoParts {
    ContentDetails,
    SnippetAndContentDetails,
}

impl VideoParts {
    fn as_str(self) -> &'static str {
        match self {
            VideoParts::ContentDetails => "contentDetails",
            VideoParts::SnippetAndContentDetails => "snippet,contentDetails",
        }
    }
}

/// Las dos llamadas a la API de datos que usa el resolver.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoApi: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchCandidate>, ResolveError>;

    /// A lo sumo 50 ids por llamada.
    async fn videos(&self, ids: &[String], parts: VideoParts) -> Result<Vec<VideoResource>, ResolveError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

impl SearchResponse {
    fn into_candidates(self) -> Vec<SearchCandidate> {
        self.items
            .into_iter()
            .filter_map(|item| {
                Some(SearchCandidate {
                    id: item.id.video_id?,
                    title: item.snippet.title,
                })
            })
            .collect()
    }
}

impl VideosResponse {
    fn into_resources(self) -> Vec<VideoResource> {
        self.items
            .into_iter()
            .map(|item| VideoResource {
                id: item.id,
                title: item.snippet.map(|s| s.title),
                duration: item.content_details.map(|c| c.duration),
            })
            .collect()
    }
}

pub struct YouTubeAPIv3Client {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeAPIv3Client {
    pub fn new(api_key: String) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { api_key, client })
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, ResolveError> {
        let response = self
            .client
            .get(format!("{}/{}", API_BASE, endpoint))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ YouTube API error: {} - {}", status, body);
            return Err(ResolveError::Status { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl VideoApi for YouTubeAPIv3Client {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchCandidate>, ResolveError> {
        debug!("🔍 Búsqueda YouTube API v3: {}", query);

        let max_results = max_results.to_string();
        let response = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("maxResults", &max_results),
                    ("q", query),
                ],
            )
            .await?;

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.into_candidates())
    }

    async fn videos(&self, ids: &[String], parts: VideoParts) -> Result<Vec<VideoResource>, ResolveError> {
        let joined = ids.join(",");
        let response = self
            .get("videos", &[("part", parts.as_str()), ("id", &joined)])
            .await?;

        let parsed: VideosResponse = response.json().await?;
        Ok(parsed.into_resources())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_search_response() {
        let body = r#"{
            "kind": "youtube#searchListResponse",
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "abc"}, "snippet": {"title": "Uno", "channelTitle": "x"}},
                {"id": {"kind": "youtube#channel", "channelId": "zzz"}, "snippet": {"title": "Canal"}},
                {"id": {"kind": "youtube#video", "videoId": "def"}, "snippet": {"title": "Dos"}}
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.into_candidates(),
            vec![
                SearchCandidate { id: "abc".into(), title: "Uno".into() },
                SearchCandidate { id: "def".into(), title: "Dos".into() },
            ]
        );
    }

    #[test]
    fn parses_videos_response_with_and_without_snippet() {
        let body = r#"{
            "items": [
                {"id": "abc", "contentDetails": {"duration": "PT4M13S"}},
                {"id": "def", "snippet": {"title": "Dos"}, "contentDetails": {"duration": "PT1H"}},
                {"id": "ghi"}
            ]
        }"#;

        let parsed: VideosResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.into_resources(),
            vec![
                VideoResource { id: "abc".into(), title: None, duration: Some("PT4M13S".into()) },
                VideoResource { id: "def".into(), title: Some("Dos".into()), duration: Some("PT1H".into()) },
                VideoResource { id: "ghi".into(), title: None, duration: None },
            ]
        );
    }

    #[test]
    fn missing_items_is_empty() {
        let parsed: VideosResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.into_resources().is_empty());
    }
}
