//! Conversación con el servicio de preguntas. Los fallos se registran como
//! mensajes del asistente marcados como error y la conversación sigue viva.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    error::DocError,
    models::{Answer, CitationRecord},
    preview::PreviewPane,
    qa_client::AnswerSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub sources: Vec<CitationRecord>,
    pub suggestions: Vec<String>,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    session_id: Uuid,
    messages: Vec<ChatMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn push_question(&mut self, question: &str) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: question.to_string(),
            sources: Vec::new(),
            suggestions: Vec::new(),
            is_error: false,
        });
    }

    pub fn record_answer(&mut self, result: Result<Answer, DocError>) -> ChatMessage {
        let message = match result {
            Ok(answer) => ChatMessage {
                role: Role::Assistant,
                content: answer.answer,
                sources: answer.sources,
                suggestions: answer.suggestions,
                is_error: false,
            },
            Err(err) => ChatMessage {
                role: Role::Assistant,
                content: err.to_string(),
                sources: Vec::new(),
                suggestions: Vec::new(),
                is_error: true,
            },
        };
        self.messages.push(message.clone());
        message
    }

    /// Fuente `index` de la última respuesta con fuentes.
    pub fn source(&self, index: usize) -> Option<&CitationRecord> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.sources.is_empty())
            .and_then(|m| m.sources.get(index))
    }
}

/// Una vuelta completa: registra la pregunta, invalida la vista previa (sus
/// resaltados pertenecen a la respuesta anterior), consulta el servicio sin
/// mantener el lock y registra la respuesta o el error.
pub async fn ask(
    conversation: &Mutex<Conversation>,
    source: &dyn AnswerSource,
    preview: &PreviewPane,
    question: &str,
) -> ChatMessage {
    let session_id = {
        let mut conv = conversation.lock().unwrap_or_else(PoisonError::into_inner);
        conv.push_question(question);
        conv.session_id().to_string()
    };
    preview.close();

    let result = source.ask(question, &session_id).await;
    if let Err(err) = &result {
        error!("{err}");
    }

    conversation
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record_answer(result)
}
