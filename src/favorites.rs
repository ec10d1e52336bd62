//! Favorites
//!
//! The pipeline only ever asks "is this token a favorite?". `FavoriteSet` is
//! the persisted store behind that question, saved as a JSON array of token
//! ids.

use crate::error::Result;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Lookup-only favorites capability
pub trait Favorites {
    fn is_favorite(&self, token_id: &str) -> bool;
}

impl<F> Favorites for F
where
    F: Fn(&str) -> bool,
{
    fn is_favorite(&self, token_id: &str) -> bool {
        self(token_id)
    }
}

/// In-memory favorites, persisted as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteSet {
    ids: BTreeSet<String>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty set; an unreadable or
    /// corrupt file is logged and treated as empty.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                warn!("Failed to read favorites from {}: {}", path.display(), e);
                return Self::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&contents) {
            Ok(ids) => {
                debug!("Loaded {} favorites from {}", ids.len(), path.display());
                Self {
                    ids: ids.into_iter().collect(),
                }
            }
            Err(e) => {
                warn!("Ignoring corrupt favorites file {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Atomically write the set to `path` (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        let ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        serde_json::to_writer(&mut tmp, &ids)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Add or remove `token_id`; returns whether it is a favorite afterwards
    pub fn toggle(&mut self, token_id: &str) -> bool {
        if self.ids.remove(token_id) {
            false
        } else {
            self.ids.insert(token_id.to_string());
            true
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl Favorites for FavoriteSet {
    fn is_favorite(&self, token_id: &str) -> bool {
        self.ids.contains(token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_and_lookup() {
        let mut favorites = FavoriteSet::new();
        assert!(favorites.toggle("0x1"));
        assert!(favorites.is_favorite("0x1"));
        assert!(!favorites.toggle("0x1"));
        assert!(!favorites.is_favorite("0x1"));
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");

        let mut favorites = FavoriteSet::new();
        favorites.toggle("0x2");
        favorites.toggle("0x1");
        favorites.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"["0x1","0x2"]"#);
        assert_eq!(FavoriteSet::load(&path), favorites);
    }

    #[test]
    fn test_missing_or_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(FavoriteSet::load(&missing).is_empty());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(FavoriteSet::load(&corrupt).is_empty());
    }

    #[test]
    fn test_closures_are_favorites() {
        let only_seven = |token_id: &str| token_id == "0x7";
        assert!(only_seven.is_favorite("0x7"));
        assert!(!only_seven.is_favorite("0x8"));
    }
}
