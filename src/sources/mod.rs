pub mod resolver;
pub mod youtube_api_v3;

pub use resolver::MediaResolver;
pub use youtube_api_v3::YouTubeAPIv3Client;

/// Metadatos de un video tal como se muestran al usuario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    /// Duración normalizada, p. ej. `4m13s`
    pub duration: String,
}

/// Normaliza una duración ISO 8601 (`PT4M13S` → `4m13s`).
///
/// Drops the leading designator and the first `T`, then lower-cases the rest.
/// Day components survive as-is (`P1DT2H` → `1d2h`).
pub fn normalize_duration(iso: &str) -> String {
    let rest = iso.strip_prefix('P').unwrap_or(iso);
    rest.replacen('T', "", 1).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_iso_durations() {
        assert_eq!(normalize_duration("PT4M13S"), "4m13s");
        assert_eq!(normalize_duration("PT1H2M3S"), "1h2m3s");
        assert_eq!(normalize_duration("PT45S"), "45s");
        assert_eq!(normalize_duration("P1DT2H"), "1d2h");
        assert_eq!(normalize_duration("P0D"), "0d");
        assert_eq!(normalize_duration(""), "");
    }
}
