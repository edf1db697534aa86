//! Carga y gestión de configuración de la aplicación (object store, servicio
//! de preguntas, preferencias locales).

use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::navigator::FailurePolicy;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub object_store_url: Url,
    pub object_store_public_url: Url,
    pub qa_service_url: Url,
    pub server_addr: String,

    pub known_folders: Vec<String>,
    pub preferences_path: PathBuf,
    pub listing_failure_policy: FailurePolicy,
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let object_store_url = var("OBJECT_STORE_URL")
            .ok_or_else(|| anyhow!("Falta OBJECT_STORE_URL en el entorno"))?;
        let object_store_url = Url::parse(&object_store_url)
            .with_context(|| format!("OBJECT_STORE_URL inválida: {object_store_url}"))?;

        let object_store_public_url = match var("OBJECT_STORE_PUBLIC_URL") {
            Some(raw) => Url::parse(&raw)
                .with_context(|| format!("OBJECT_STORE_PUBLIC_URL inválida: {raw}"))?,
            None => object_store_url.clone(),
        };

        let qa_raw = var("QA_SERVICE_URL").unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
        let qa_service_url =
            Url::parse(&qa_raw).with_context(|| format!("QA_SERVICE_URL inválida: {qa_raw}"))?;

        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());

        let known_folders = var("KNOWN_FOLDERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let preferences_path = match var("PREFERENCES_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_preferences_path()?,
        };

        let listing_failure_policy = var("LISTING_FAILURE_POLICY")
            .map(|raw| raw.parse::<FailurePolicy>())
            .transpose()?
            .unwrap_or_default();

        let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("REQUEST_TIMEOUT_SECS inválido: {raw}"))?,
            ),
            None => Duration::from_secs(30),
        };

        Ok(Self {
            object_store_url,
            object_store_public_url,
            qa_service_url,
            server_addr,
            known_folders,
            preferences_path,
            listing_failure_policy,
            request_timeout,
        })
    }
}

fn default_preferences_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("No se pudo determinar el directorio de configuración del usuario."))?;
    Ok(base.join("meddoc-navigator").join("preferences.json"))
}
