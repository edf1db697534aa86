//! Memoria de prefijos conocidos: conjunto persistente, ordenado y sin
//! duplicados de carpetas vistas, usado sólo como ayuda de navegación cuando
//! el listado real no está disponible. Nunca es autoritativo.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Result;
use tracing::{info, warn};

use crate::location::SEPARATOR;

/// Persistencia del conjunto, intercambiable por plataforma.
pub trait PrefixRepository: Send + Sync {
    fn load(&self) -> Result<Vec<String>>;
    fn save(&self, prefixes: &[String]) -> Result<()>;
}

/// Repositorio volátil para pruebas.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct InMemoryPrefixes {
    stored: Mutex<Vec<String>>,
}

#[cfg(test)]
impl PrefixRepository for InMemoryPrefixes {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, prefixes: &[String]) -> Result<()> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = prefixes.to_vec();
        Ok(())
    }
}

pub struct PrefixMemory {
    repo: Arc<dyn PrefixRepository>,
    configured: BTreeSet<String>,
    learned: Mutex<BTreeSet<String>>,
}

impl PrefixMemory {
    /// Carga lo aprendido en sesiones anteriores. Un fallo de carga deja la
    /// memoria vacía en lugar de impedir el arranque.
    pub fn new(repo: Arc<dyn PrefixRepository>, configured: &[String]) -> Self {
        let learned = match repo.load() {
            Ok(stored) => normalize_all(&stored),
            Err(e) => {
                warn!("No se pudieron cargar los prefijos conocidos: {e:#}");
                BTreeSet::new()
            }
        };
        Self {
            repo,
            configured: normalize_all(configured),
            learned: Mutex::new(learned),
        }
    }

    /// Fusiona nuevos segmentos. Sólo persiste si el conjunto creció; un
    /// fallo de persistencia se registra y se ignora.
    ///
    /// El lock se mantiene durante el guardado: dos fusiones solapadas no
    /// pueden persistir sus copias en desorden.
    pub fn remember<S: AsRef<str>>(&self, segments: &[S]) {
        let mut learned = self.learned.lock().unwrap_or_else(PoisonError::into_inner);
        let before = learned.len();
        learned.extend(segments.iter().filter_map(|s| normalize(s.as_ref())));
        if learned.len() == before {
            return;
        }
        let snapshot: Vec<String> = learned.iter().cloned().collect();

        match self.repo.save(&snapshot) {
            Ok(()) => info!("Prefijos conocidos actualizados ({}).", snapshot.len()),
            Err(e) => warn!("No se pudieron guardar los prefijos conocidos: {e:#}"),
        }
    }

    /// Prefijos configurados por el operador más los aprendidos.
    pub fn fallback(&self) -> Vec<String> {
        let learned = self.learned.lock().unwrap_or_else(PoisonError::into_inner);
        self.configured.union(&learned).cloned().collect()
    }
}

fn normalize(segment: &str) -> Option<String> {
    let trimmed = segment.trim().trim_start_matches(SEPARATOR);
    if trimmed.trim_end_matches(SEPARATOR).is_empty() {
        return None;
    }
    if trimmed.ends_with(SEPARATOR) {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}{SEPARATOR}"))
    }
}

fn normalize_all<S: AsRef<str>>(segments: &[S]) -> BTreeSet<String> {
    segments.iter().filter_map(|s| normalize(s.as_ref())).collect()
}
