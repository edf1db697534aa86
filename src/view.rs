//! Proyección de la vista: filtro, orden y paginación sobre el listado actual.
//!
//! Función pura: mismas entradas, misma salida, sin estado de orden oculto.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::{
    location::Location,
    models::{FileEntry, FolderEntry},
};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Date,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub filter: String,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl ViewState {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            filter: String::new(),
            sort_key: SortKey::Name,
            sort_direction: SortDirection::Asc,
            page: 1,
            page_size: clamp_page_size(page_size),
        }
    }
}

pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

/// Filas listas para pintar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
    pub page: usize,
    pub total_pages: usize,
    pub total_files: usize,
}

pub fn project(
    location: &Location,
    folders: &[FolderEntry],
    files: &[FileEntry],
    view: &ViewState,
) -> Projection {
    let needle = view.filter.trim().to_lowercase();
    let matches = |name: &str| needle.is_empty() || name.to_lowercase().contains(&needle);

    let mut shown_folders: Vec<FolderEntry> = folders
        .iter()
        .filter(|f| matches(&f.display_name))
        .cloned()
        .collect();
    shown_folders.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let mut filtered: Vec<&FileEntry> = files
        .iter()
        .filter(|f| matches(f.name_in(location)))
        .collect();
    filtered.sort_by(|a, b| {
        let ordering = compare_files(a, b, view.sort_key, location);
        match view.sort_direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    let page_size = clamp_page_size(view.page_size);
    let total_files = filtered.len();
    let total_pages = total_files.div_ceil(page_size).max(1);
    let page = view.page.clamp(1, total_pages);

    let shown_files = filtered
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();

    Projection {
        folders: shown_folders,
        files: shown_files,
        page,
        total_pages,
        total_files,
    }
}

fn compare_files(a: &FileEntry, b: &FileEntry, key: SortKey, location: &Location) -> Ordering {
    let primary = match key {
        SortKey::Name => a.name_in(location).cmp(b.name_in(location)),
        SortKey::Size => a.size.cmp(&b.size),
        SortKey::Date => timestamp(a).cmp(&timestamp(b)),
    };
    // Desempate por clave para que el orden sea total.
    primary.then_with(|| a.key.cmp(&b.key))
}

fn timestamp(file: &FileEntry) -> i64 {
    file.last_modified.map(|ts| ts.timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn file(key: &str, size: u64) -> FileEntry {
        FileEntry {
            key: key.to_string(),
            size,
            last_modified: None,
            url: format!("https://cdn.test/{key}"),
            content_type: None,
        }
    }

    fn folder(location: &Location, name: &str) -> FolderEntry {
        FolderEntry {
            full_path: Location::new(&format!("{location}{name}")),
            display_name: name.to_string(),
        }
    }

    fn sizes(p: &Projection) -> Vec<u64> {
        p.files.iter().map(|f| f.size).collect()
    }

    #[test]
    fn sorts_by_size_both_ways() {
        let loc = Location::root();
        let files = vec![file("a", 300), file("b", 10), file("c", 2048)];
        let mut view = ViewState {
            sort_key: SortKey::Size,
            ..ViewState::default()
        };
        assert_eq!(sizes(&project(&loc, &[], &files, &view)), vec![10, 300, 2048]);

        view.sort_direction = SortDirection::Desc;
        assert_eq!(sizes(&project(&loc, &[], &files, &view)), vec![2048, 300, 10]);
    }

    #[test]
    fn missing_dates_sort_as_epoch() {
        let loc = Location::root();
        let mut dated = file("dated", 1);
        dated.last_modified = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let files = vec![dated, file("undated", 2)];
        let view = ViewState {
            sort_key: SortKey::Date,
            ..ViewState::default()
        };
        let keys: Vec<_> = project(&loc, &[], &files, &view)
            .files
            .into_iter()
            .map(|f| f.key)
            .collect();
        assert_eq!(keys, vec!["undated", "dated"]);
    }

    #[test]
    fn pagination_clamps_out_of_range_pages() {
        let loc = Location::root();
        let files: Vec<_> = (0..120).map(|i| file(&format!("f{i:03}"), i)).collect();
        let view = ViewState {
            page: 5,
            ..ViewState::with_page_size(50)
        };
        let projection = project(&loc, &[], &files, &view);
        assert_eq!(projection.total_pages, 3);
        assert_eq!(projection.page, 3);
        assert_eq!(projection.files.len(), 20);
        assert_eq!(projection.files[0].key, "f100");
    }

    #[test]
    fn empty_listing_has_one_page() {
        let projection = project(&Location::root(), &[], &[], &ViewState::default());
        assert_eq!(projection.total_pages, 1);
        assert_eq!(projection.page, 1);
    }

    #[test]
    fn filter_is_case_insensitive_and_folders_ignore_sort_key() {
        let loc = Location::new("patients/");
        let folders = vec![folder(&loc, "Zeta"), folder(&loc, "alpha"), folder(&loc, "Beta")];
        let files = vec![file("patients/Ana.pdf", 1), file("patients/bob.pdf", 2)];
        let view = ViewState {
            filter: "A".into(),
            sort_key: SortKey::Size,
            sort_direction: SortDirection::Desc,
            ..ViewState::default()
        };
        let projection = project(&loc, &folders, &files, &view);
        let names: Vec<_> = projection
            .folders
            .iter()
            .map(|f| f.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Beta", "Zeta", "alpha"]);
        assert_eq!(projection.files.len(), 1);
        assert_eq!(projection.files[0].key, "patients/Ana.pdf");
    }

    #[test]
    fn filter_matches_relative_name_only() {
        let loc = Location::new("patients/");
        let files = vec![file("patients/x.pdf", 1)];
        let view = ViewState {
            filter: "patients".into(),
            ..ViewState::default()
        };
        assert!(project(&loc, &[], &files, &view).files.is_empty());
    }

    #[test]
    fn projection_is_idempotent() {
        let loc = Location::root();
        let files = vec![file("b", 1), file("a", 1), file("c", 1)];
        let view = ViewState {
            sort_key: SortKey::Size,
            ..ViewState::default()
        };
        let first = project(&loc, &[], &files, &view);
        let second = project(&loc, &[], &files, &view);
        assert_eq!(first, second);
    }
}
