//! Star names.
//!
//! The database never owns name data. It talks to a [`StarNameDatabase`]
//! supplied by the caller; [`MemoryNameDatabase`] is a plain in-memory one
//! for tools and tests.

use std::collections::{BTreeMap, HashMap};

use crate::star::CatalogNumber;

/// Bidirectional name ↔ catalog number service.
///
/// `i18n` selects localized names where the implementation has them.
pub trait StarNameDatabase: Send + Sync {
    fn find_catalog_number(&self, name: &str, i18n: bool) -> Option<CatalogNumber>;

    /// Every name of a star, most prominent first. Empty if it has none.
    fn names(&self, catalog_number: CatalogNumber, i18n: bool) -> Vec<String>;

    /// Names starting with `prefix`, ignoring case.
    fn completion(&self, prefix: &str, i18n: bool) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct NameEntry {
    canonical: String,
    localized: Option<String>,
}

impl NameEntry {
    fn display(&self, i18n: bool) -> &str {
        match (&self.localized, i18n) {
            (Some(localized), true) => localized,
            _ => &self.canonical,
        }
    }
}

/// Names held in memory. Lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct MemoryNameDatabase {
    by_star: HashMap<CatalogNumber, Vec<NameEntry>>,
    canonical: BTreeMap<String, CatalogNumber>,
    localized: BTreeMap<String, CatalogNumber>,
}

impl MemoryNameDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` to a star. A name already given to another star is
    /// moved to this one.
    pub fn add(&mut self, catalog_number: CatalogNumber, name: impl Into<String>) {
        self.insert(catalog_number, name.into(), None);
    }

    pub fn add_localized(
        &mut self,
        catalog_number: CatalogNumber,
        name: impl Into<String>,
        localized: impl Into<String>,
    ) {
        self.insert(catalog_number, name.into(), Some(localized.into()));
    }

    fn insert(&mut self, catalog_number: CatalogNumber, name: String, localized: Option<String>) {
        let key = name.to_lowercase();
        if let Some(previous) = self.canonical.insert(key.clone(), catalog_number) {
            self.detach(previous, &key);
        }
        if let Some(localized) = &localized {
            self.localized.insert(localized.to_lowercase(), catalog_number);
        }
        self.by_star.entry(catalog_number).or_default().push(NameEntry {
            canonical: name,
            localized,
        });
    }

    /// Removes the entry named `key` from the star that held it.
    fn detach(&mut self, owner: CatalogNumber, key: &str) {
        let Some(entries) = self.by_star.get_mut(&owner) else {
            return;
        };
        let localized = &mut self.localized;
        entries.retain(|entry| {
            if entry.canonical.to_lowercase() != key {
                return true;
            }
            if let Some(name) = &entry.localized {
                let name = name.to_lowercase();
                if localized.get(&name) == Some(&owner) {
                    localized.remove(&name);
                }
            }
            false
        });
        if entries.is_empty() {
            self.by_star.remove(&owner);
        }
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Reads `number:name[:name...]` lines, the layout of the usual
    /// `starnames.dat`. Blank lines and `#` comments are skipped; malformed
    /// lines are logged and skipped.
    pub fn parse(text: &str) -> Self {
        let mut db = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split(':');
            let number = parts.next().and_then(|n| n.trim().parse::<CatalogNumber>().ok());
            let Some(number) = number else {
                log::warn!("Skipping star name line {}: bad catalog number", lineno + 1);
                continue;
            };
            for name in parts.map(str::trim).filter(|n| !n.is_empty()) {
                db.add(number, name);
            }
        }
        db
    }

    fn complete_in(map: &BTreeMap<String, CatalogNumber>, prefix: &str) -> Vec<CatalogNumber> {
        let prefix = prefix.to_lowercase();
        map.range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .map(|(_, &n)| n)
            .collect()
    }
}

impl StarNameDatabase for MemoryNameDatabase {
    fn find_catalog_number(&self, name: &str, i18n: bool) -> Option<CatalogNumber> {
        let key = name.trim().to_lowercase();
        if i18n {
            if let Some(&n) = self.localized.get(&key) {
                return Some(n);
            }
        }
        self.canonical.get(&key).copied()
    }

    fn names(&self, catalog_number: CatalogNumber, i18n: bool) -> Vec<String> {
        self.by_star
            .get(&catalog_number)
            .map(|entries| entries.iter().map(|e| e.display(i18n).to_string()).collect())
            .unwrap_or_default()
    }

    fn completion(&self, prefix: &str, i18n: bool) -> Vec<String> {
        let lower = prefix.to_lowercase();
        let map = if i18n { &self.localized } else { &self.canonical };
        let mut out: Vec<String> = Self::complete_in(map, prefix)
            .into_iter()
            .filter_map(|n| self.by_star.get(&n))
            .flatten()
            .map(|e| e.display(i18n))
            .filter(|name| name.to_lowercase().starts_with(&lower))
            .map(str::to_string)
            .collect();
        if i18n {
            // Stars without a localized form still complete by their canonical name.
            out.extend(
                Self::complete_in(&self.canonical, prefix)
                    .into_iter()
                    .filter_map(|n| self.by_star.get(&n))
                    .flatten()
                    .filter(|e| e.localized.is_none())
                    .map(|e| e.canonical.clone())
                    .filter(|name| name.to_lowercase().starts_with(&lower)),
            );
        }
        out.sort_unstable_by_key(|name| name.to_lowercase());
        out.dedup();
        out
    }
}
