//! Cliente de listado del object store (API `list-type=2` con delimitador).
//!
//! API pública:
//!   - `ObjectLister` (trait inyectable en el navegador)
//!   - `S3Lister` (implementación HTTP)
//!   - `parse_list_response(&str, &Location, &str)`
//!   - `derived_url(&str, &str)`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use roxmltree::{Document, Node};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::DocError,
    location::{Location, SEPARATOR},
    models::{FileEntry, FolderEntry, Listing},
};

const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Límite de páginas `IsTruncated` que se siguen en un único listado.
const MAX_LIST_PAGES: usize = 20;

/// Todo salvo alfanuméricos, el separador y los no reservados de RFC 3986.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Fuente de listados: una consulta por ubicación, de sólo lectura.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn list(&self, location: &Location) -> Result<Listing, DocError>;
}

/// Una página de resultados parseada.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub listing: Listing,
    pub next_token: Option<String>,
}

/// Listado contra un bucket compatible con S3 vía HTTP.
#[derive(Debug, Clone)]
pub struct S3Lister {
    http: reqwest::Client,
    list_url: Url,
    public_base: String,
}

impl S3Lister {
    pub fn new(http: reqwest::Client, list_url: Url, public_base: &Url) -> Self {
        Self {
            http,
            list_url,
            public_base: public_base.to_string(),
        }
    }

    async fn fetch_page(
        &self,
        location: &Location,
        token: Option<&str>,
    ) -> Result<ListPage, DocError> {
        let delimiter = SEPARATOR.to_string();
        let mut query = vec![
            ("list-type", "2"),
            ("delimiter", delimiter.as_str()),
            ("prefix", location.as_str()),
        ];
        if let Some(token) = token {
            query.push(("continuation-token", token));
        }

        let response = self
            .http
            .get(self.list_url.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| DocError::listing(location.as_str(), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DocError::listing(location.as_str(), e))?;

        if !status.is_success() {
            let reason = store_error_reason(&body).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(DocError::listing(location.as_str(), reason));
        }

        parse_list_response(&body, location, &self.public_base)
    }
}

#[async_trait]
impl ObjectLister for S3Lister {
    async fn list(&self, location: &Location) -> Result<Listing, DocError> {
        let mut listing = Listing::default();
        let mut token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let page = self.fetch_page(location, token.as_deref()).await?;
            listing.folders.extend(page.listing.folders);
            listing.files.extend(page.listing.files);
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(listing),
            }
        }

        warn!(
            "Listado de '{}' truncado tras {} páginas.",
            location, MAX_LIST_PAGES
        );
        Ok(listing)
    }
}

/// Parsea el documento XML de `ListObjectsV2`.
pub fn parse_list_response(
    body: &str,
    location: &Location,
    public_base: &str,
) -> Result<ListPage, DocError> {
    let doc = Document::parse(body)
        .map_err(|e| DocError::listing(location.as_str(), format!("XML inválido: {e}")))?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "ListBucketResult" => {}
        "Error" => {
            let reason = error_reason(root);
            return Err(DocError::listing(location.as_str(), reason));
        }
        other => {
            return Err(DocError::listing(
                location.as_str(),
                format!("respuesta sin estructura reconocible (<{other}>)"),
            ))
        }
    }

    let folders = elements(root, "CommonPrefixes")
        .into_iter()
        .filter_map(|node| child_text(node, "Prefix"))
        .filter_map(|prefix| FolderEntry::from_prefix(prefix, location))
        .collect();

    let files = elements(root, "Contents")
        .into_iter()
        .filter_map(|node| file_entry(node, public_base))
        .collect();

    let truncated = child_text(root, "IsTruncated") == Some("true");
    let next_token = if truncated {
        child_text(root, "NextContinuationToken").map(str::to_string)
    } else {
        None
    };

    Ok(ListPage {
        listing: Listing { folders, files },
        next_token,
    })
}

/// URL pública de una clave, codificando todo salvo el separador.
pub fn derived_url(public_base: &str, key: &str) -> String {
    let base = public_base.trim_end_matches(SEPARATOR);
    format!("{base}/{}", utf8_percent_encode(key, KEY_ENCODE_SET))
}

fn file_entry(node: Node, public_base: &str) -> Option<FileEntry> {
    let key = child_text(node, "Key")?.to_string();
    let size = child_text(node, "Size")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);

    if FileEntry::is_folder_marker(&key, size) {
        debug!("Omitiendo marcador de carpeta {key}");
        return None;
    }

    let last_modified = child_text(node, "LastModified").and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!("Fecha ilegible '{raw}' en {key}: {e}");
                None
            }
        }
    });

    let content_type = mime_guess::from_path(&key)
        .first()
        .map(|m| m.essence_str().to_string());

    Some(FileEntry {
        url: derived_url(public_base, &key),
        key,
        size,
        last_modified,
        content_type,
    })
}

/// Hijos directos con ese nombre, primero en el namespace de S3 y, si no
/// aparece ninguno, ignorando el namespace.
fn elements<'a, 'input>(root: Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
    let namespaced: Vec<_> = root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .filter(|n| n.tag_name().namespace() == Some(S3_NAMESPACE))
        .collect();
    if !namespaced.is_empty() {
        return namespaced;
    }
    root.children()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .collect()
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
}

fn error_reason(root: Node) -> String {
    let code = child_text(root, "Code").unwrap_or("Error");
    match child_text(root, "Message") {
        Some(message) => format!("{code}: {message}"),
        None => code.to_string(),
    }
}

fn store_error_reason(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    let root = doc.root_element();
    (root.tag_name().name() == "Error").then(|| error_reason(root))
}
