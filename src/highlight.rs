//! Extracción de fragmentos a resaltar a partir de un registro de cita.
//!
//! El texto citado se parte en segmentos, pares `etiqueta: valor`, frases de
//! 2 y 3 palabras y palabras sueltas largas, de más a menos específico.

use serde::Serialize;
use std::collections::HashSet;

use crate::models::CitationRecord;

/// Longitud mínima (en caracteres) de cualquier fragmento.
pub const MIN_FRAGMENT_CHARS: usize = 3;

/// Las palabras sueltas deben superar esta longitud.
const MIN_WORD_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Passage,
    Segment,
    Field,
    Phrase,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightFragment {
    pub text: String,
    pub priority: Priority,
}

/// Minúsculas, sin puntuación y con los espacios colapsados. La comparten
/// el extractor y el matcher.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn extract_fragments(record: &CitationRecord) -> Vec<HighlightFragment> {
    extract_from_text(&record.highlight.joined())
}

pub fn extract_from_text(raw: &str) -> Vec<HighlightFragment> {
    // El servicio devuelve "N/A" cuando el fragmento no aporta nada.
    if raw.trim().eq_ignore_ascii_case("n/a") {
        return Vec::new();
    }

    let mut set = FragmentSet::default();
    set.push(normalize(raw), Priority::Passage);

    let segments: Vec<String> = split_segments(raw);
    for segment in &segments {
        set.push(normalize(segment), Priority::Segment);
    }

    for segment in &segments {
        if let Some((label, value)) = segment.split_once(':') {
            let (label, value) = (normalize(label), normalize(value));
            if !label.is_empty() && !value.is_empty() {
                set.push(label, Priority::Field);
                set.push(value, Priority::Field);
            }
        }
    }

    let normalized: Vec<String> = segments.iter().map(|s| normalize(s)).collect();
    for size in [3, 2] {
        for segment in &normalized {
            let words: Vec<&str> = segment.split(' ').collect();
            for window in words.windows(size) {
                set.push(window.join(" "), Priority::Phrase);
            }
        }
    }

    for segment in &normalized {
        for word in segment.split(' ') {
            if word.chars().count() > MIN_WORD_CHARS {
                set.push(word.to_string(), Priority::Word);
            }
        }
    }

    set.into_ordered()
}

fn split_segments(raw: &str) -> Vec<String> {
    raw.replace(" - ", "\n")
        .replace("  ", "\n")
        .split(|c: char| matches!(c, '\n' | '\r' | ',' | ';'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Default)]
struct FragmentSet {
    seen: HashSet<String>,
    items: Vec<HighlightFragment>,
}

impl FragmentSet {
    fn push(&mut self, text: String, priority: Priority) {
        if text.chars().count() < MIN_FRAGMENT_CHARS || self.seen.contains(&text) {
            return;
        }
        self.seen.insert(text.clone());
        self.items.push(HighlightFragment { text, priority });
    }

    fn into_ordered(mut self) -> Vec<HighlightFragment> {
        // Orden estable: dentro de cada prioridad se conserva la inserción.
        self.items.sort_by_key(|f| f.priority);
        self.items
    }
}
