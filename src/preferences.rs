//! Preferencias locales persistidas como JSON (ubicación por defecto, filas
//! por página, recordar última carpeta, mostrar tamaños, prefijos conocidos).

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    location::Location,
    prefix_memory::PrefixRepository,
    view::{clamp_page_size, DEFAULT_PAGE_SIZE},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub default_location: Location,
    pub rows_per_page: usize,
    pub remember_last_folder: bool,
    pub show_sizes: bool,
    pub last_folder: Option<Location>,
    pub known_prefixes: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_location: Location::root(),
            rows_per_page: DEFAULT_PAGE_SIZE,
            remember_last_folder: false,
            show_sizes: true,
            last_folder: None,
            known_prefixes: Vec::new(),
        }
    }
}

impl Preferences {
    pub fn normalized(mut self) -> Self {
        self.rows_per_page = clamp_page_size(self.rows_per_page);
        self
    }

    /// Ubicación con la que arranca el navegador.
    pub fn start_location(&self) -> Location {
        match (&self.last_folder, self.remember_last_folder) {
            (Some(last), true) => last.clone(),
            _ => self.default_location.clone(),
        }
    }
}

/// Fichero de preferencias. Las escrituras se serializan con un mutex para
/// que las actualizaciones parciales no se pisen.
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lee el fichero. Si no existe devuelve los valores por defecto.
    pub fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("leyendo {}", self.path.display()))?;
        let prefs: Preferences = serde_json::from_str(&raw)
            .with_context(|| format!("parseando {}", self.path.display()))?;
        Ok(prefs.normalized())
    }

    pub fn load_or_default(&self) -> Preferences {
        self.load().unwrap_or_else(|e| {
            warn!("Preferencias ilegibles, se usan los valores por defecto: {e:#}");
            Preferences::default()
        })
    }

    /// Lectura-modificación-escritura atómica respecto a este proceso.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<Preferences> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut prefs = self.load_or_default();
        change(&mut prefs);
        let prefs = prefs.normalized();
        self.write(&prefs)?;
        Ok(prefs)
    }

    fn write(&self, prefs: &Preferences) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creando directorio {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(prefs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("escribiendo {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("reemplazando {}", self.path.display()))?;
        Ok(())
    }
}

impl PrefixRepository for PreferencesStore {
    fn load(&self) -> Result<Vec<String>> {
        Ok(PreferencesStore::load(self)?.known_prefixes)
    }

    fn save(&self, prefixes: &[String]) -> Result<()> {
        self.update(|prefs| prefs.known_prefixes = prefixes.to_vec())
            .map(|_| ())
    }
}
