//! Decide si un trozo de la capa de texto de una página debe marcarse.

use std::collections::HashSet;

use crate::highlight::{normalize, HighlightFragment};

struct PreparedFragment {
    text: String,
    words: HashSet<String>,
}

impl PreparedFragment {
    fn new(raw: &str) -> Option<Self> {
        let text = normalize(raw);
        if text.is_empty() {
            return None;
        }
        let words = text.split(' ').map(str::to_string).collect();
        Some(Self { text, words })
    }

    fn is_multi_word(&self) -> bool {
        self.words.len() > 1 || self.text.contains(' ')
    }

    fn accepts(&self, span: &str, span_words: &[&str]) -> bool {
        if self.text == span {
            return true;
        }
        if !self.is_multi_word() {
            return false;
        }
        // Un token suelto sólo casa con una palabra exacta de la frase; un
        // trozo de varias palabras, si todas están en la frase (el renderer
        // puede partir una frase en trozos contiguos).
        span_words.iter().all(|w| self.words.contains(*w))
    }
}

/// Fragmentos preparados para marcar muchos trozos de la misma página.
pub struct SpanMatcher {
    fragments: Vec<PreparedFragment>,
}

impl SpanMatcher {
    pub fn new<S: AsRef<str>>(fragments: &[S]) -> Self {
        Self {
            fragments: fragments
                .iter()
                .filter_map(|f| PreparedFragment::new(f.as_ref()))
                .collect(),
        }
    }

    pub fn from_fragments(fragments: &[HighlightFragment]) -> Self {
        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        Self::new(&texts)
    }

    pub fn matches(&self, span: &str) -> bool {
        let span = normalize(span);
        if span.is_empty() {
            return false;
        }
        let span_words: Vec<&str> = span.split(' ').collect();
        self.fragments
            .iter()
            .any(|fragment| fragment.accepts(&span, &span_words))
    }

    pub fn mark_all<S: AsRef<str>>(&self, spans: &[S]) -> Vec<bool> {
        spans.iter().map(|s| self.matches(s.as_ref())).collect()
    }
}

pub fn should_highlight<S: AsRef<str>>(span: &str, fragments: &[S]) -> bool {
    SpanMatcher::new(fragments).matches(span)
}
