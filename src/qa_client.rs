//! Cliente del servicio externo de preguntas y resúmenes.
//!
//! `/ask` responde con un stream `text/event-stream` de eventos
//! `data: {json}`: estados intermedios (`status`), un error (`error`) o la
//! respuesta final (`answer` + `sources`). Si la respuesta no es un stream se
//! interpreta como un único JSON con la respuesta final.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;

use crate::{error::DocError, models::Answer};

/// Evento del stream de respuesta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    Status(String),
    Error(String),
    Final(Answer),
}

/// Origen de respuestas; el cliente HTTP es la implementación real.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn ask(&self, question: &str, session_id: &str) -> Result<Answer, DocError>;
}

#[derive(Debug, Clone)]
pub struct QaClient {
    http: reqwest::Client,
    base: Url,
}

impl QaClient {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    fn endpoint(&self, name: &str) -> Option<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut().ok()?.pop_if_empty().push(name);
        Some(url)
    }

    /// Pregunta al servicio e informa de cada estado intermedio.
    pub async fn ask_with_progress(
        &self,
        question: &str,
        session_id: &str,
        mut on_status: impl FnMut(&str) + Send,
    ) -> Result<Answer, DocError> {
        let url = self
            .endpoint("ask")
            .ok_or_else(|| DocError::AnswerFailure(format!("URL base inválida: {}", self.base)))?;

        let response = self
            .http
            .get(url)
            .query(&[("question", question), ("session_id", session_id)])
            .send()
            .await
            .map_err(|e| DocError::AnswerFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocError::AnswerFailure(format!("HTTP {status}")));
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if !is_stream {
            return response
                .json::<Answer>()
                .await
                .map_err(|e| DocError::AnswerFailure(format!("respuesta ilegible: {e}")));
        }

        let mut events = std::pin::pin!(response.bytes_stream().eventsource());
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| DocError::AnswerFailure(e.to_string()))?;
            if let Some(outcome) = handle_event(&event.data, &mut on_status) {
                return outcome;
            }
        }

        Err(DocError::AnswerFailure(
            "el stream terminó sin respuesta final".to_string(),
        ))
    }

    /// Resumen en markdown de un documento. Un 404 o un cuerpo vacío
    /// significan que todavía no se ha generado.
    pub async fn fetch_summary(&self, key: &str) -> Result<String, DocError> {
        let unavailable = || DocError::PreviewUnavailable {
            key: key.to_string(),
        };
        let url = self.endpoint("summary").ok_or_else(unavailable)?;

        let response = self
            .http
            .get(url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| {
                error!("Error pidiendo el resumen de {key}: {e}");
                unavailable()
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(unavailable()),
            status if !status.is_success() => {
                warn!("Resumen de {key} respondió HTTP {status}");
                return Err(unavailable());
            }
            _ => {}
        }

        let body = response.text().await.map_err(|_| unavailable())?;
        if body.trim().is_empty() {
            return Err(unavailable());
        }
        Ok(body)
    }
}

#[async_trait]
impl AnswerSource for QaClient {
    async fn ask(&self, question: &str, session_id: &str) -> Result<Answer, DocError> {
        self.ask_with_progress(question, session_id, |status| debug!("{status}"))
            .await
    }
}

fn handle_event(
    data: &str,
    on_status: &mut (impl FnMut(&str) + Send),
) -> Option<Result<Answer, DocError>> {
    match parse_event(data) {
        Some(AnswerEvent::Status(status)) => {
            on_status(&status);
            None
        }
        Some(AnswerEvent::Error(message)) => Some(Err(DocError::AnswerFailure(message))),
        Some(AnswerEvent::Final(answer)) => Some(Ok(answer)),
        None => {
            warn!("Evento del stream ignorado: {data}");
            None
        }
    }
}

/// Interpreta el JSON de un evento `data:`.
pub fn parse_event(data: &str) -> Option<AnswerEvent> {
    let value: Value = serde_json::from_str(data).ok()?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Some(AnswerEvent::Error(message.to_string()));
    }
    if value.get("answer").is_some() {
        return serde_json::from_value(value).ok().map(AnswerEvent::Final);
    }
    value
        .get("status")
        .and_then(Value::as_str)
        .map(|s| AnswerEvent::Status(s.to_string()))
}
