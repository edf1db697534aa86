//! Taxonomía de errores del núcleo de navegación y resaltado.
//!
//! Ninguno es fatal: cada variante se contiene localmente y se recupera
//! repitiendo la acción del usuario (refrescar, reabrir, reenviar).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocError {
    /// Error de red o de parseo durante un listado del object store.
    #[error("No se pudo listar '{location}': {reason}")]
    ListingFailure { location: String, reason: String },

    /// Todavía no existe un resumen para el documento.
    #[error("Resumen no disponible para '{key}'")]
    PreviewUnavailable { key: String },

    /// El servicio de preguntas falló o el stream reportó un error.
    #[error("Error al obtener la respuesta: {0}")]
    AnswerFailure(String),

    /// El documento no pudo renderizarse en páginas.
    #[error("No se pudo renderizar '{key}': {reason}")]
    RenderFailure { key: String, reason: String },
}

impl DocError {
    pub fn listing(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ListingFailure {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn render(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::RenderFailure {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}
