//! Catalog-number lookup over the finished star array.

use crate::star::{CatalogNumber, Star};

/// Stars sorted by catalog number, searched by bisection.
///
/// Handles are positions in this array; the octree stores them in place of
/// star references.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    stars: Vec<Star>,
}

impl CatalogIndex {
    /// Wraps `stars`, sorting them if they are not sorted already.
    pub fn new(mut stars: Vec<Star>) -> Self {
        if !stars
            .windows(2)
            .all(|w| w[0].catalog_number() < w[1].catalog_number())
        {
            stars.sort_by_key(Star::catalog_number);
        }
        Self { stars }
    }

    pub fn find(&self, catalog_number: CatalogNumber) -> Option<&Star> {
        self.handle_of(catalog_number).map(|h| &self.stars[h as usize])
    }

    /// Position of `catalog_number` in the sorted array.
    pub fn handle_of(&self, catalog_number: CatalogNumber) -> Option<u32> {
        self.stars
            .binary_search_by_key(&catalog_number, Star::catalog_number)
            .ok()
            .map(|i| i as u32)
    }

    pub fn get(&self, handle: u32) -> Option<&Star> {
        self.stars.get(handle as usize)
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Stars in catalog-number order.
    pub fn iter(&self) -> std::slice::Iter<'_, Star> {
        self.stars.iter()
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }
}

impl<'a> IntoIterator for &'a CatalogIndex {
    type Item = &'a Star;
    type IntoIter = std::slice::Iter<'a, Star>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
