use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption},
};
use std::collections::HashMap;

use crate::{audio::queue::QueueSnapshot, sources::VideoInfo};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const YOUTUBE_RED: Colour = Colour::new(0xff0000);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

/// Custom id del menú de resultados de búsqueda.
pub const SEARCH_MENU_ID: &str = "ytSelect";

const STANDARD_FOOTER: &str = "🎵 Tube Bot";

// Límites de Discord, en caracteres
const OPTION_LABEL_LIMIT: usize = 100;
const PLACEHOLDER_LIMIT: usize = 150;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;
const QUERY_ECHO_LIMIT: usize = 1978;

/// Corta `text` a `max_chars` caracteres sin partir un carácter multibyte.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Texto de la cola: lo que suena y lo que viene después, numerado desde 1.
///
/// Ids without metadata fall back to the bare id.
pub fn queue_description(snapshot: &QueueSnapshot, info: &HashMap<String, VideoInfo>) -> String {
    let line = |id: &str| match info.get(id) {
        Some(video) => format!("{} ({})", video.title, video.duration),
        None => format!("{} (?)", id),
    };

    let mut description = String::new();

    if let Some(current) = snapshot.now_playing() {
        description.push_str(&format!("**Sonando ahora:**\n{}\n", line(current)));
    }

    let up_next = snapshot.up_next();
    if !up_next.is_empty() {
        description.push_str("\n**A continuación:**\n");
        for (position, id) in up_next.iter().enumerate() {
            description.push_str(&format!("{}. {}\n", position + 1, line(id)));
        }
    }

    truncate(&description, EMBED_DESCRIPTION_LIMIT).to_string()
}

pub fn create_queue_embed(description: String) -> CreateEmbed {
    CreateEmbed::default()
        .title("📜 Cola")
        .description(description)
        .color(colors::YOUTUBE_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn search_placeholder(query: &str) -> String {
    truncate(&format!("Resultados para {}", query), PLACEHOLDER_LIMIT).to_string()
}

pub fn no_results_message(query: &str) -> String {
    format!("No se encontraron resultados para {}.", truncate(query, QUERY_ECHO_LIMIT))
}

/// Menú de selección múltiple con los resultados de una búsqueda.
pub fn create_search_menu(query: &str, results: &[VideoInfo]) -> CreateSelectMenu {
    let options: Vec<CreateSelectMenuOption> = results
        .iter()
        .map(|video| {
            CreateSelectMenuOption::new(truncate(&video.title, OPTION_LABEL_LIMIT), &video.id)
                .description(&video.duration)
        })
        .collect();

    let max_values = u8::try_from(options.len()).unwrap_or(u8::MAX);

    CreateSelectMenu::new(SEARCH_MENU_ID, CreateSelectMenuKind::String { options })
        .placeholder(search_placeholder(query))
        .min_values(1)
        .max_values(max_values)
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn video(id: &str, title: &str, duration: &str) -> (String, VideoInfo) {
        (
            id.to_string(),
            VideoInfo { id: id.to_string(), title: title.to_string(), duration: duration.to_string() },
        )
    }

    #[test]
    fn renders_now_playing_and_up_next() {
        let snapshot = QueueSnapshot {
            items: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            cursor: Some(1),
        };
        let info: HashMap<_, _> = [
            video("a", "Primero", "3m"),
            video("b", "Segundo", "4m13s"),
            video("c", "Tercero", "1h2m"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            queue_description(&snapshot, &info),
            "**Sonando ahora:**\nSegundo (4m13s)\n\n**A continuación:**\n1. Tercero (1h2m)\n2. d (?)\n"
        );
    }

    #[test]
    fn last_item_has_no_up_next_section() {
        let snapshot = QueueSnapshot { items: vec!["a".into()], cursor: Some(0) };
        let info: HashMap<_, _> = [video("a", "Solo", "45s")].into_iter().collect();

        assert_eq!(queue_description(&snapshot, &info), "**Sonando ahora:**\nSolo (45s)\n");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("canción", 6), "canció");
        assert_eq!(truncate("🎵🎵🎵", 2), "🎵🎵");
        assert_eq!(truncate("corto", 100), "corto");
    }

    #[test]
    fn placeholder_and_echo_respect_limits() {
        let long = "ñ".repeat(3000);

        assert_eq!(search_placeholder(&long).chars().count(), 150);
        assert!(search_placeholder("lofi").ends_with("lofi"));

        let message = no_results_message(&long);
        assert_eq!(message.chars().filter(|c| *c == 'ñ').count(), 1978);
    }
}
