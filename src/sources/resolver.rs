use futures::future::try_join_all;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info};

use super::{
    normalize_duration,
    youtube_api_v3::{VideoApi, VideoParts},
    VideoInfo,
};

/// Máximo de ids aceptados por una llamada a `videos`.
const MAX_IDS_PER_REQUEST: usize = 50;

/// Duración mostrada cuando `videos` no devuelve el candidato.
const UNKNOWN_DURATION: &str = "?";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YouTube API respondió {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("respuesta inválida: {0}")]
    Invalid(String),
}

/// Búsqueda y metadatos de videos, compuestos a partir de dos llamadas a la API.
pub struct MediaResolver {
    api: Arc<dyn VideoApi>,
    max_results: usize,
}

impl MediaResolver {
    pub fn new(api: Arc<dyn VideoApi>, max_results: usize) -> Self {
        Self { api, max_results }
    }

    /// Busca videos y les agrega la duración.
    ///
    /// Results keep the search order. Durations are matched by id; a
    /// candidate the second call does not return keeps an unknown `?` duration.
    pub async fn search(&self, query: &str) -> Result<Vec<VideoInfo>, ResolveError> {
        let candidates = self.api.search(query, self.max_results).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let durations: HashMap<String, String> = self
            .api
            .videos(&ids, VideoParts::ContentDetails)
            .await?
            .into_iter()
            .filter_map(|video| Some((video.id, video.duration?)))
            .collect();

        let unknown = candidates
            .iter()
            .filter(|candidate| !durations.contains_key(&candidate.id))
            .count();
        if unknown > 0 {
            debug!("❔ {} candidatos sin duración conocida", unknown);
        }

        let results: Vec<VideoInfo> = candidates
            .into_iter()
            .map(|candidate| VideoInfo {
                duration: durations
                    .get(&candidate.id)
                    .map(|duration| normalize_duration(duration))
                    .unwrap_or_else(|| UNKNOWN_DURATION.to_string()),
                id: candidate.id,
                title: candidate.title,
            })
            .collect();
        info!("✅ YouTube API v3: {} resultados para '{}'", results.len(), query);

        Ok(results)
    }

    /// Título y duración de cada id, para mostrar la cola.
    pub async fn resolve_metadata(&self, ids: &[String]) -> Result<HashMap<String, VideoInfo>, ResolveError> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for id in ids {
            if seen.insert(id.as_str()) {
                unique.push(id.clone());
            }
        }

        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let requests = unique
            .chunks(MAX_IDS_PER_REQUEST)
            .map(|chunk| self.api.videos(chunk, VideoParts::SnippetAndContentDetails));
        let pages = try_join_all(requests).await?;

        let resolved: HashMap<String, VideoInfo> = pages
            .into_iter()
            .flatten()
            .map(|video| {
                let info = VideoInfo {
                    title: video.title.unwrap_or_default(),
                    duration: video.duration.as_deref().map(normalize_duration).unwrap_or_default(),
                    id: video.id.clone(),
                };
                (video.id, info)
            })
            .collect();

        debug!("📋 Metadatos resueltos: {}/{}", resolved.len(), unique.len());
        Ok(resolved)
    }
}
