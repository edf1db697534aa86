//! Vista previa de un documento con los pasajes citados resaltados.
//!
//! Sólo hay un documento abierto a la vez. Abrir otro sustituye la sesión de
//! golpe, y marcar trozos con el id de una sesión anterior no resalta nada.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::DocError,
    highlight::HighlightFragment,
    listing::derived_url,
    qa_client::QaClient,
    span_matcher::SpanMatcher,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewSession {
    pub id: Uuid,
    pub document_key: String,
    pub page: Option<u32>,
    pub fragments: Vec<HighlightFragment>,
}

#[derive(Debug, Default)]
pub struct PreviewPane {
    current: Mutex<Option<PreviewSession>>,
}

impl PreviewPane {
    pub fn open(
        &self,
        document_key: String,
        page: Option<u32>,
        fragments: Vec<HighlightFragment>,
    ) -> PreviewSession {
        let session = PreviewSession {
            id: Uuid::new_v4(),
            document_key,
            page,
            fragments,
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        session
    }

    pub fn close(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn current(&self) -> Option<PreviewSession> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Matcher de la sesión `session` si sigue abierta; si no, uno vacío que
    /// no marca nada.
    pub fn matcher_for(&self, session: Uuid) -> SpanMatcher {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(open) if open.id == session => SpanMatcher::from_fragments(&open.fragments),
            _ => SpanMatcher::new(&[] as &[&str]),
        }
    }

    /// Marca los trozos de la capa de texto de una página. Si `session` ya no
    /// es la sesión abierta, ningún trozo se marca.
    pub fn mark(&self, session: Uuid, spans: &[String]) -> Vec<bool> {
        self.matcher_for(session).mark_all(spans)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedSpan {
    pub text: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPage {
    pub number: u32,
    pub spans: Vec<MarkedSpan>,
}

/// Trozos de la capa de texto de una página: una línea no vacía por trozo.
pub fn text_layer(page_text: &str) -> Vec<String> {
    page_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn mark_pages(pages: &[String], matcher: &SpanMatcher) -> Vec<RenderedPage> {
    pages
        .iter()
        .enumerate()
        .map(|(idx, text)| RenderedPage {
            number: idx as u32 + 1,
            spans: text_layer(text)
                .into_iter()
                .map(|span| MarkedSpan {
                    highlighted: matcher.matches(&span),
                    text: span,
                })
                .collect(),
        })
        .collect()
}

/// Descarga el documento y extrae el texto de cada página.
pub async fn load_pages(
    http: &reqwest::Client,
    key: &str,
    url: &str,
) -> Result<Vec<String>, DocError> {
    let mime = mime_guess::from_path(key).first();
    let is_pdf = mime.as_ref().is_some_and(|m| m.essence_str() == "application/pdf");
    let is_text = mime.as_ref().is_some_and(|m| m.type_() == mime_guess::mime::TEXT);
    if !is_pdf && !is_text {
        return Err(DocError::render(key, "formato sin capa de texto"));
    }

    let response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DocError::render(key, e))?;
    let bytes = response.bytes().await.map_err(|e| DocError::render(key, e))?;

    if is_text {
        return Ok(vec![String::from_utf8_lossy(&bytes).into_owned()]);
    }

    // pdf-extract es síncrono y puede entrar en pánico con PDFs dañados.
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| DocError::render(key, e))?
        .map_err(|e| DocError::render(key, e))
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewView {
    pub session: PreviewSession,
    pub url: String,
    pub pages: Vec<RenderedPage>,
    pub render_error: Option<String>,
    pub summary: Option<String>,
    pub summary_notice: Option<String>,
}

/// Abre un documento: nueva sesión de resaltado, páginas marcadas y resumen.
/// Los fallos de renderizado y la falta de resumen quedan dentro de la vista.
pub async fn open_document(
    pane: &PreviewPane,
    http: &reqwest::Client,
    qa: &QaClient,
    public_base: &str,
    document_key: String,
    page: Option<u32>,
    fragments: Vec<HighlightFragment>,
) -> PreviewView {
    let session = pane.open(document_key, page, fragments);
    let key = session.document_key.as_str();
    let url = derived_url(public_base, key);
    info!("Abriendo vista previa de {key} ({} fragmentos).", session.fragments.len());

    let (pages, summary) = tokio::join!(load_pages(http, key, &url), qa.fetch_summary(key));

    // La sesión pudo sustituirse o cerrarse durante la descarga.
    let matcher = pane.matcher_for(session.id);
    let (pages, render_error) = match pages {
        Ok(texts) => (mark_pages(&texts, &matcher), None),
        Err(err) => {
            error!("{err}");
            (Vec::new(), Some(err.to_string()))
        }
    };
    let (summary, summary_notice) = match summary {
        Ok(summary) => (Some(summary), None),
        Err(err) => (None, Some(err.to_string())),
    };

    PreviewView {
        session,
        url,
        pages,
        render_error,
        summary,
        summary_notice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::extract_from_text;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn opening_another_document_invalidates_previous_highlights() {
        let pane = PreviewPane::default();
        let first = pane.open("a.pdf".into(), None, extract_from_text("fever"));
        let spans = vec!["fever".to_string()];
        assert_eq!(pane.mark(first.id, &spans), vec![true]);

        let second = pane.open("b.pdf".into(), None, extract_from_text("cough"));
        assert_eq!(pane.mark(first.id, &spans), vec![false]);
        assert_eq!(pane.mark(second.id, &["cough".to_string()]), vec![true]);

        pane.close();
        assert_eq!(pane.mark(second.id, &["cough".to_string()]), vec![false]);
    }

    #[test]
    fn pages_are_numbered_and_marked() {
        let matcher = SpanMatcher::from_fragments(&extract_from_text("prescribed Amoxicillin"));
        let pages = vec!["Header\n\n".to_string(), "  Dose:\nAmoxicillin\n".to_string()];
        let rendered = mark_pages(&pages, &matcher);
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].number, 2);
        assert_eq!(
            rendered[1].spans,
            vec![
                MarkedSpan { text: "Dose:".into(), highlighted: false },
                MarkedSpan { text: "Amoxicillin".into(), highlighted: true },
            ]
        );
    }

    #[tokio::test]
    async fn unsupported_format_is_a_render_failure() {
        let err = load_pages(&reqwest::Client::new(), "scan.tiff", "http://unused.test/scan.tiff")
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::RenderFailure { .. }));
    }

    #[tokio::test]
    async fn open_document_renders_text_and_reports_missing_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/patients/notes.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("Dr. Tan\nprescribed Amoxicillin\nand rest"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/summary"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let qa = QaClient::new(http.clone(), Url::parse(&server.uri()).unwrap());
        let pane = PreviewPane::default();

        let view = open_document(
            &pane,
            &http,
            &qa,
            &server.uri(),
            "patients/notes.txt".into(),
            Some(1),
            extract_from_text("Dr. Tan: prescribed Amoxicillin"),
        )
        .await;

        assert_eq!(view.render_error, None);
        let marks: Vec<bool> = view.pages[0].spans.iter().map(|s| s.highlighted).collect();
        assert_eq!(marks, vec![true, true, false]);
        assert_eq!(view.summary, None);
        assert!(view.summary_notice.is_some());
        assert_eq!(pane.current().map(|s| s.id), Some(view.session.id));
    }

    #[tokio::test]
    async fn document_replaced_during_download_is_not_highlighted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("fever\ncough")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/summary"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let qa = QaClient::new(http.clone(), Url::parse(&server.uri()).unwrap());
        let pane = PreviewPane::default();
        let base = server.uri();

        let (view, replacement) = tokio::join!(
            open_document(
                &pane,
                &http,
                &qa,
                &base,
                "a.txt".into(),
                None,
                extract_from_text("fever"),
            ),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                pane.open("b.txt".into(), None, extract_from_text("cough"))
            }
        );

        assert_eq!(pane.current().map(|s| s.id), Some(replacement.id));
        assert_ne!(view.session.id, replacement.id);
        assert_eq!(view.pages.len(), 1);
        assert!(view.pages[0].spans.iter().all(|s| !s.highlighted));
    }

    #[tokio::test]
    async fn download_failure_leaves_preview_without_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let qa = QaClient::new(http.clone(), Url::parse(&server.uri()).unwrap());
        let pane = PreviewPane::default();
        let view = open_document(
            &pane,
            &http,
            &qa,
            &server.uri(),
            "patients/ana.pdf".into(),
            None,
            Vec::new(),
        )
        .await;

        assert!(view.pages.is_empty());
        assert!(view.render_error.is_some());
    }
}
