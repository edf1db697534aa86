//! Máquina de estados de la jerarquía de carpetas y el servicio que la
//! conecta con el cliente de listado y la memoria de prefijos.
//!
//! Flujo de una navegación:
//!   1. `begin(destino)` pasa a `Loading` y entrega un ticket con generación.
//!   2. Se lista el destino sin mantener ningún lock.
//!   3. `complete(ticket, resultado)` aplica el resultado sólo si el ticket
//!      sigue siendo el vigente; una respuesta tardía de otra ubicación se
//!      descarta.

use std::{
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    error::DocError,
    listing::ObjectLister,
    location::{top_segment_of_key, Breadcrumb, Location},
    models::{FileEntry, FolderEntry, Listing},
    preferences::{Preferences, PreferencesStore},
    prefix_memory::PrefixMemory,
    view::{clamp_page_size, project, Projection, SortDirection, SortKey, ViewState},
};

/// Qué mostrar cuando un listado falla.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Vaciar carpetas y ficheros y mostrar el error.
    #[default]
    Blank,
    /// Mantener el último listado correcto junto al error.
    KeepStale,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "blank" => Ok(Self::Blank),
            "keep-stale" | "keep_stale" => Ok(Self::KeepStale),
            other => Err(anyhow!("Política de fallo de listado no soportada: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NavState {
    Idle,
    Loading {
        target: Location,
    },
    Loaded {
        location: Location,
        folders: Vec<FolderEntry>,
        files: Vec<FileEntry>,
    },
    Error {
        location: Location,
        message: String,
        folders: Vec<FolderEntry>,
        files: Vec<FileEntry>,
    },
}

/// Cambio parcial de la vista pedido por el frontend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewUpdate {
    pub filter: Option<String>,
    pub sort_key: Option<SortKey>,
    pub sort_direction: Option<SortDirection>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// Identifica una navegación concreta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavTicket {
    generation: u64,
    pub target: Location,
}

/// Resultado de aplicar una respuesta de listado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Listado aplicado; segmentos a recordar en la memoria de prefijos.
    Loaded { remember: Vec<String> },
    Failed { message: String },
    /// La respuesta llegó tarde: otra navegación la ha sustituido.
    Stale,
}

#[derive(Debug)]
pub struct Navigator {
    state: NavState,
    view: ViewState,
    default_location: Location,
    generation: u64,
    policy: FailurePolicy,
    stale_rows: Option<StaleRows>,
    show_sizes: bool,
}

/// Último listado mostrado y la ubicación a la que pertenece.
#[derive(Debug)]
struct StaleRows {
    location: Location,
    folders: Vec<FolderEntry>,
    files: Vec<FileEntry>,
}

impl Navigator {
    pub fn new(default_location: Location, page_size: usize, policy: FailurePolicy) -> Self {
        Self {
            state: NavState::Idle,
            view: ViewState::with_page_size(page_size),
            default_location,
            generation: 0,
            policy,
            stale_rows: None,
            show_sizes: true,
        }
    }

    pub fn from_preferences(prefs: &Preferences, policy: FailurePolicy) -> Self {
        let mut navigator = Self::new(prefs.default_location.clone(), prefs.rows_per_page, policy);
        navigator.apply_preferences(prefs);
        navigator
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn apply_preferences(&mut self, prefs: &Preferences) {
        self.default_location = prefs.default_location.clone();
        self.set_page_size(prefs.rows_per_page);
        self.show_sizes = prefs.show_sizes;
    }

    /// Ubicación actual (o la que se está cargando).
    pub fn current_location(&self) -> Location {
        match &self.state {
            NavState::Idle => Location::root(),
            NavState::Loading { target } => target.clone(),
            NavState::Loaded { location, .. } | NavState::Error { location, .. } => {
                location.clone()
            }
        }
    }

    pub fn begin(&mut self, target: Location) -> NavTicket {
        self.generation += 1;
        if target != self.current_location() {
            self.view.page = 1;
        }
        let previous = std::mem::replace(
            &mut self.state,
            NavState::Loading {
                target: target.clone(),
            },
        );
        // Con KeepStale el listado anterior se conserva hasta saber el resultado.
        if self.policy == FailurePolicy::KeepStale {
            if let Some(rows) = rows_of(previous) {
                self.stale_rows = Some(rows);
            }
        }
        NavTicket {
            generation: self.generation,
            target,
        }
    }

    pub fn complete(
        &mut self,
        ticket: NavTicket,
        result: Result<Listing, DocError>,
    ) -> Transition {
        if ticket.generation != self.generation {
            return Transition::Stale;
        }

        match result {
            Ok(listing) => {
                let remember = segments_to_remember(&ticket.target, &listing);
                self.state = NavState::Loaded {
                    location: ticket.target,
                    folders: listing.folders,
                    files: listing.files,
                };
                self.view.page = 1;
                self.stale_rows = None;
                Transition::Loaded { remember }
            }
            Err(err) => {
                let message = err.to_string();
                // Filas de otra ubicación nunca se muestran bajo el destino.
                let (folders, files) = match (self.policy, self.stale_rows.take()) {
                    (FailurePolicy::KeepStale, Some(stale)) if stale.location == ticket.target => {
                        (stale.folders, stale.files)
                    }
                    _ => (Vec::new(), Vec::new()),
                };
                self.state = NavState::Error {
                    location: ticket.target,
                    message: message.clone(),
                    folders,
                    files,
                };
                Transition::Failed { message }
            }
        }
    }

    /// Destino de "subir"; `None` en la raíz.
    pub fn parent_target(&self) -> Option<Location> {
        let current = self.current_location();
        (!current.is_root()).then(|| current.parent())
    }

    /// Destino de "ir a la ubicación por defecto"; `None` si ya estamos ahí.
    pub fn default_target(&self) -> Option<Location> {
        let at_default = matches!(
            &self.state,
            NavState::Loaded { location, .. } if *location == self.default_location
        );
        (!at_default).then(|| self.default_location.clone())
    }

    pub fn set_filter(&mut self, filter: String) {
        if self.view.filter != filter {
            self.view.filter = filter;
            self.view.page = 1;
        }
    }

    pub fn set_sort(&mut self, key: SortKey, direction: SortDirection) {
        if self.view.sort_key != key || self.view.sort_direction != direction {
            self.view.sort_key = key;
            self.view.sort_direction = direction;
            self.view.page = 1;
        }
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        let page_size = clamp_page_size(page_size);
        if self.view.page_size != page_size {
            self.view.page_size = page_size;
            self.view.page = 1;
        }
    }

    pub fn set_page(&mut self, page: usize) {
        self.view.page = page.max(1);
    }

    /// Aplica un cambio parcial de la vista. Si sólo llega la clave o la
    /// dirección de orden, la otra conserva su valor actual.
    pub fn apply_view(&mut self, update: ViewUpdate) {
        if let Some(filter) = update.filter {
            self.set_filter(filter);
        }
        if update.sort_key.is_some() || update.sort_direction.is_some() {
            self.set_sort(
                update.sort_key.unwrap_or(self.view.sort_key),
                update.sort_direction.unwrap_or(self.view.sort_direction),
            );
        }
        if let Some(page_size) = update.page_size {
            self.set_page_size(page_size);
        }
        if let Some(page) = update.page {
            self.set_page(page);
        }
    }

    /// Carpetas y ficheros visibles en el estado actual.
    fn rows(&self) -> (&[FolderEntry], &[FileEntry]) {
        match &self.state {
            NavState::Loaded { folders, files, .. } | NavState::Error { folders, files, .. } => {
                (folders.as_slice(), files.as_slice())
            }
            NavState::Idle | NavState::Loading { .. } => (&[], &[]),
        }
    }

    pub fn projection(&self) -> Projection {
        let (folders, files) = self.rows();
        project(&self.current_location(), folders, files, &self.view)
    }
}

fn rows_of(state: NavState) -> Option<StaleRows> {
    match state {
        NavState::Loaded {
            location,
            folders,
            files,
        } => Some(StaleRows {
            location,
            folders,
            files,
        }),
        NavState::Error {
            location,
            folders,
            files,
            ..
        } if !(folders.is_empty() && files.is_empty()) => Some(StaleRows {
            location,
            folders,
            files,
        }),
        _ => None,
    }
}

/// La ubicación actual más el segmento superior de cada carpeta y fichero.
fn segments_to_remember(location: &Location, listing: &Listing) -> Vec<String> {
    let mut segments = Vec::new();
    if !location.is_root() {
        segments.push(location.as_str().to_string());
    }
    segments.extend(listing.folders.iter().filter_map(|f| f.full_path.top_segment()));
    segments.extend(listing.files.iter().filter_map(|f| top_segment_of_key(&f.key)));
    segments.sort();
    segments.dedup();
    segments
}

/// Vista serializable del navegador para el frontend.
#[derive(Debug, Clone, Serialize)]
pub struct NavigatorSnapshot {
    pub status: NavState,
    pub location: Location,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub view: ViewState,
    pub rows: Projection,
    pub can_go_up: bool,
    pub at_default: bool,
    pub show_sizes: bool,
    /// Prefijos conocidos cuando el listado falló o no devolvió nada.
    pub quick_access: Option<Vec<String>>,
}

/// Navegador + cliente de listado + memoria de prefijos.
pub struct NavigatorService {
    navigator: Mutex<Navigator>,
    lister: Arc<dyn ObjectLister>,
    memory: Arc<PrefixMemory>,
    preferences: Option<Arc<PreferencesStore>>,
}

impl NavigatorService {
    pub fn new(
        navigator: Navigator,
        lister: Arc<dyn ObjectLister>,
        memory: Arc<PrefixMemory>,
        preferences: Option<Arc<PreferencesStore>>,
    ) -> Self {
        Self {
            navigator: Mutex::new(navigator),
            lister,
            memory,
            preferences,
        }
    }

    fn with_navigator<T>(&self, f: impl FnOnce(&mut Navigator) -> T) -> T {
        let mut navigator = self.navigator.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut navigator)
    }

    pub fn memory(&self) -> &PrefixMemory {
        &self.memory
    }

    pub async fn navigate_to(&self, target: Location) -> Transition {
        let ticket = self.with_navigator(|nav| nav.begin(target));
        let target = ticket.target.clone();

        let result = self.lister.list(&target).await;

        let transition = self.with_navigator(|nav| nav.complete(ticket, result));
        match &transition {
            Transition::Loaded { remember } => {
                info!("Listado de '{target}' cargado.");
                self.memory.remember(remember);
                self.remember_last_folder(&target);
            }
            Transition::Stale => {
                warn!("Respuesta obsoleta para '{target}' descartada.");
            }
            Transition::Failed { message } => {
                error!("{message}");
            }
        }
        transition
    }

    /// `None` si ya está en la raíz.
    pub async fn go_up(&self) -> Option<Transition> {
        let target = self.with_navigator(|nav| nav.parent_target())?;
        Some(self.navigate_to(target).await)
    }

    pub async fn refresh(&self) -> Transition {
        let target = self.with_navigator(|nav| nav.current_location());
        self.navigate_to(target).await
    }

    /// `None` si ya está en la ubicación por defecto.
    pub async fn go_to_default(&self) -> Option<Transition> {
        let target = self.with_navigator(|nav| nav.default_target())?;
        Some(self.navigate_to(target).await)
    }

    pub fn update_view(&self, update: ViewUpdate) {
        self.with_navigator(|nav| nav.apply_view(update));
    }

    pub fn apply_preferences(&self, prefs: &Preferences) {
        self.with_navigator(|nav| nav.apply_preferences(prefs));
    }

    pub fn snapshot(&self) -> NavigatorSnapshot {
        let (status, location, view, rows, can_go_up, at_default, show_sizes) =
            self.with_navigator(|nav| {
                (
                    nav.state().clone(),
                    nav.current_location(),
                    nav.view().clone(),
                    nav.projection(),
                    nav.parent_target().is_some(),
                    nav.default_target().is_none(),
                    nav.show_sizes,
                )
            });

        let needs_fallback = match &status {
            NavState::Error { .. } => true,
            NavState::Loaded { folders, files, .. } => folders.is_empty() && files.is_empty(),
            _ => false,
        };

        NavigatorSnapshot {
            breadcrumbs: location.breadcrumbs(),
            status,
            location,
            view,
            rows,
            can_go_up,
            at_default,
            show_sizes,
            quick_access: needs_fallback.then(|| self.memory.fallback()),
        }
    }

    fn remember_last_folder(&self, location: &Location) {
        let Some(store) = &self.preferences else {
            return;
        };
        let result = store.update(|prefs| {
            if prefs.remember_last_folder {
                prefs.last_folder = Some(location.clone());
            }
        });
        if let Err(e) = result {
            warn!("No se pudo guardar la última carpeta: {e:#}");
        }
    }
}
