//! Modelos de dominio: entradas del listado del object store y registros de
//! cita devueltos por el servicio de preguntas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Carpeta un nivel por debajo de la ubicación actual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub full_path: Location,
    pub display_name: String,
}

impl FolderEntry {
    /// Construye la entrada a partir de un prefijo agrupado. Devuelve `None`
    /// si el prefijo no es un hijo directo de `current`.
    pub fn from_prefix(prefix: &str, current: &Location) -> Option<Self> {
        let display_name = current
            .relative(prefix)
            .trim_end_matches(crate::location::SEPARATOR)
            .to_string();
        if display_name.is_empty() || display_name.contains(crate::location::SEPARATOR) {
            return None;
        }
        Some(Self {
            full_path: Location::from_store_prefix(prefix),
            display_name,
        })
    }
}

/// Objeto individual del store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub url: String,
    pub content_type: Option<String>,
}

impl FileEntry {
    /// Objetos de tamaño cero cuya clave termina en el separador: marcadores
    /// de carpeta que nunca se muestran como ficheros.
    pub fn is_folder_marker(key: &str, size: u64) -> bool {
        size == 0 && key.ends_with(crate::location::SEPARATOR)
    }

    pub fn name_in<'a>(&'a self, location: &Location) -> &'a str {
        location.relative(&self.key)
    }
}

/// Resultado parseado de una consulta de listado.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

/// El texto resaltado puede venir como cadena o como lista de fragmentos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HighlightText {
    Single(String),
    Many(Vec<String>),
}

impl Default for HighlightText {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

impl HighlightText {
    pub fn joined(&self) -> String {
        match self {
            Self::Single(text) => text.clone(),
            Self::Many(parts) => parts.join("\n"),
        }
    }
}

/// Procedencia de una respuesta: documento, página y fragmento citado.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    #[serde(default, alias = "file", alias = "documentKey")]
    pub document_key: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, alias = "highlight", alias = "highlightText")]
    pub highlight: HighlightText,
    #[serde(default)]
    pub source: Option<String>,
}

impl CitationRecord {
    /// Clave del documento citado. Si falta, se deduce de `source`
    /// (`s3://<bucket>/<clave>#page=<n>`).
    pub fn resolved_key(&self) -> Option<String> {
        if let Some(key) = self.document_key.as_deref().filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }
        let source = self.source.as_deref()?;
        let without_anchor = source.split('#').next().unwrap_or(source);
        let rest = without_anchor.strip_prefix("s3://")?;
        let (_bucket, key) = rest.split_once('/')?;
        (!key.is_empty()).then(|| key.to_string())
    }

    /// Página citada (1-based), tomada del ancla `#page=` si no viene explícita.
    pub fn resolved_page(&self) -> Option<u32> {
        self.page.or_else(|| {
            let anchor = self.source.as_deref()?.split_once("#page=")?.1;
            anchor.parse().ok()
        })
    }
}

/// Respuesta final del servicio de preguntas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default)]
    pub question: Option<String>,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<CitationRecord>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}
