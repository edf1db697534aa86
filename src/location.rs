//! Ubicaciones virtuales (prefijos) dentro del object store.
//!
//! Una `Location` es vacía (raíz) o termina en el separador `/`.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Location(String);

/// Un elemento de la ruta de migas de pan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub location: Location,
}

impl Location {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Normaliza una ruta arbitraria: sin `/` inicial, con `/` final y sin
    /// segmentos vacíos. Un segmento de sólo espacios es un nombre válido.
    pub fn new(raw: &str) -> Self {
        let mut normalized = String::new();
        for segment in raw.split(SEPARATOR).filter(|s| !s.is_empty()) {
            normalized.push_str(segment);
            normalized.push(SEPARATOR);
        }
        Self(normalized)
    }

    /// Prefijo tal como lo devuelve el store; sólo se garantiza el `/` final.
    pub fn from_store_prefix(prefix: &str) -> Self {
        if prefix.is_empty() || prefix.ends_with(SEPARATOR) {
            Self(prefix.to_string())
        } else {
            Self(format!("{prefix}{SEPARATOR}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Elimina el último segmento no vacío. En la raíz devuelve la raíz.
    pub fn parent(&self) -> Self {
        let trimmed = self.0.trim_end_matches(SEPARATOR);
        match trimmed.rfind(SEPARATOR) {
            Some(idx) => Self(trimmed[..=idx].to_string()),
            None => Self::root(),
        }
    }

    /// Primer segmento con su separador (`"a/b/"` → `"a/"`).
    pub fn top_segment(&self) -> Option<String> {
        self.segments().next().map(|s| format!("{s}{SEPARATOR}"))
    }

    /// Quita el prefijo de esta ubicación a una clave completa.
    pub fn relative<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.0.as_str()).unwrap_or(key)
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            name: SEPARATOR.to_string(),
            location: Self::root(),
        }];
        let mut acc = String::new();
        for segment in self.segments() {
            acc.push_str(segment);
            acc.push(SEPARATOR);
            crumbs.push(Breadcrumb {
                name: segment.to_string(),
                location: Self(acc.clone()),
            });
        }
        crumbs
    }
}

/// Primer segmento de carpeta de una clave arbitraria, si la clave está
/// dentro de alguna carpeta (`"patients/a.pdf"` → `"patients/"`).
pub fn top_segment_of_key(key: &str) -> Option<String> {
    let key = key.trim_start_matches(SEPARATOR);
    key.find(SEPARATOR)
        .filter(|idx| *idx > 0)
        .map(|idx| key[..=idx].to_string())
}

impl From<String> for Location {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "{SEPARATOR}")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_normalizes_separators() {
        assert_eq!(Location::new("/patients//2024").as_str(), "patients/2024/");
        assert_eq!(Location::new("").as_str(), "");
        assert_eq!(Location::new("///").as_str(), "");
        assert_eq!(Location::new("a/ /").as_str(), "a/ /");
    }

    #[test]
    fn store_prefixes_are_kept_verbatim() {
        assert_eq!(Location::from_store_prefix("a//b/").as_str(), "a//b/");
        assert_eq!(Location::from_store_prefix("a/ ").as_str(), "a/ /");
        assert_eq!(Location::from_store_prefix("").as_str(), "");
    }

    #[test]
    fn parent_twice_from_three_segments() {
        let loc = Location::new("a/b/c/");
        assert_eq!(loc.parent().parent(), Location::new("a/"));
        assert_eq!(Location::root().parent(), Location::root());
        assert_eq!(Location::new("a/").parent(), Location::root());
    }

    #[test]
    fn breadcrumbs_accumulate_segments() {
        let crumbs = Location::new("patients/2024/").breadcrumbs();
        let names: Vec<_> = crumbs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["/", "patients", "2024"]);
        assert_eq!(crumbs[2].location.as_str(), "patients/2024/");
    }

    #[test]
    fn top_segments() {
        assert_eq!(Location::new("a/b/").top_segment().as_deref(), Some("a/"));
        assert_eq!(Location::root().top_segment(), None);
        assert_eq!(top_segment_of_key("patients/x/y.pdf").as_deref(), Some("patients/"));
        assert_eq!(top_segment_of_key("readme.pdf"), None);
    }

    #[test]
    fn relative_strips_prefix() {
        let loc = Location::new("patients/");
        assert_eq!(loc.relative("patients/ana.pdf"), "ana.pdf");
        assert_eq!(loc.relative("guidelines/x.pdf"), "guidelines/x.pdf");
    }

    #[test]
    fn serde_goes_through_normalization() {
        let loc: Location = serde_json::from_str("\"/a/b\"").unwrap();
        assert_eq!(loc.as_str(), "a/b/");
        assert_eq!(serde_json::to_string(&loc).unwrap(), "\"a/b/\"");
    }
}
