//! The finished, immutable star database.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use nalgebra::Vector3;

use crate::error::Result;
use crate::index::CatalogIndex;
use crate::names::StarNameDatabase;
use crate::octree::{OctreeConfig, OctreeStats, StarHandler, StarOctree, ViewParams};
use crate::star::{CatalogNumber, Star, MAX_HIPPARCOS_NUMBER};
use crate::xindex::{CrossIndex, CrossIndexCatalog};

/// Default cap for [`StarDatabase::star_name_list`].
pub const MAX_STAR_NAMES: usize = 10;

const TYC3_FACTOR: u64 = 1_000_000_000;
const TYC2_FACTOR: u64 = 10_000;

/// Stars, their catalog index and octree, cross indexes and an optional
/// name database.
///
/// Built by [`StarLoader::finish`](crate::loader::StarLoader::finish). The
/// star set never changes afterwards; cross indexes and the name database
/// can still be attached.
pub struct StarDatabase {
    index: CatalogIndex,
    octree: StarOctree,
    cross_indexes: [Option<CrossIndex>; 3],
    names: Option<Arc<dyn StarNameDatabase>>,
}

impl fmt::Debug for StarDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StarDatabase")
            .field("stars", &self.index.len())
            .field("octree_nodes", &self.octree.node_count())
            .field(
                "cross_indexes",
                &CrossIndexCatalog::ALL
                    .iter()
                    .filter(|c| self.cross_indexes[c.slot()].is_some())
                    .collect::<Vec<_>>(),
            )
            .field("names", &self.names.is_some())
            .finish()
    }
}

impl Default for StarDatabase {
    fn default() -> Self {
        Self::build(Vec::new(), [None, None, None], &OctreeConfig::default())
    }
}

impl StarDatabase {
    /// `stars` must be sorted by catalog number with no duplicates.
    pub(crate) fn build(
        stars: Vec<Star>,
        cross_indexes: [Option<CrossIndex>; 3],
        config: &OctreeConfig,
    ) -> Self {
        let index = CatalogIndex::new(stars);
        let octree = StarOctree::build(index.stars(), config);
        Self {
            index,
            octree,
            cross_indexes,
            names: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Star at `handle`, the position in catalog-number order.
    pub fn get(&self, handle: u32) -> Option<&Star> {
        self.index.get(handle)
    }

    pub fn find(&self, catalog_number: CatalogNumber) -> Option<&Star> {
        self.index.find(catalog_number)
    }

    pub fn stars(&self) -> &[Star] {
        self.index.stars()
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    pub fn octree(&self) -> &StarOctree {
        &self.octree
    }

    // -- names ---------------------------------------------------------------

    pub fn set_name_database(&mut self, names: Arc<dyn StarNameDatabase>) {
        self.names = Some(names);
    }

    pub fn name_database(&self) -> Option<&Arc<dyn StarNameDatabase>> {
        self.names.as_ref()
    }

    pub fn find_by_name(&self, name: &str, i18n: bool) -> Option<&Star> {
        self.find_catalog_number_by_name(name, i18n)
            .and_then(|n| self.find(n))
    }

    /// Resolves a name through the name database, then as a `HIP`, `TYC`,
    /// `HD`, `SAO` or `Gliese` designation.
    ///
    /// The number is returned even if no such star is loaded.
    pub fn find_catalog_number_by_name(&self, name: &str, i18n: bool) -> Option<CatalogNumber> {
        if let Some(n) = self
            .names
            .as_ref()
            .and_then(|db| db.find_catalog_number(name, i18n))
        {
            return Some(n);
        }

        let name = name.trim();
        if let Some(n) = strip_prefix_ignore_case(name, "HIP").and_then(|rest| rest.parse().ok()) {
            return Some(n);
        }
        if let Some(n) = strip_prefix_ignore_case(name, "TYC").and_then(parse_tycho) {
            return Some(n);
        }
        let (catalog, number) = CrossIndexCatalog::parse_designation(name)?;
        self.search_cross_index_for_catalog_number(catalog, number)
    }

    /// The star's first name, or its `HIP`/`TYC` designation.
    pub fn star_name(&self, star: &Star, i18n: bool) -> String {
        self.names
            .as_ref()
            .and_then(|db| db.names(star.catalog_number(), i18n).into_iter().next())
            .unwrap_or_else(|| designation(star.catalog_number()))
    }

    /// Up to `max_names` names of the star joined by `" / "`: proper names,
    /// then the catalog designation, then `HD`, `SAO` and `Gliese` numbers.
    pub fn star_name_list(&self, star: &Star, max_names: usize) -> String {
        let catalog_number = star.catalog_number();
        let mut names: Vec<String> = self
            .names
            .as_ref()
            .map(|db| db.names(catalog_number, true))
            .unwrap_or_default();
        names.push(designation(catalog_number));

        for catalog in [
            CrossIndexCatalog::HenryDraper,
            CrossIndexCatalog::Sao,
            CrossIndexCatalog::Gliese,
        ] {
            if let Some(n) = self.cross_indexes[catalog.slot()]
                .as_ref()
                .and_then(|index| index.reverse_lookup(catalog_number))
            {
                names.push(format!("{} {}", catalog.prefix(), n));
            }
        }

        let mut seen = std::collections::HashSet::new();
        names.retain(|n| seen.insert(n.clone()));
        names.truncate(max_names);
        names.join(" / ")
    }

    /// Name completions from the name database; empty without one.
    pub fn completion(&self, prefix: &str, i18n: bool) -> Vec<String> {
        self.names
            .as_ref()
            .map(|db| db.completion(prefix, i18n))
            .unwrap_or_default()
    }

    // -- cross indexes ---------------------------------------------------------

    pub fn add_cross_index(&mut self, catalog: CrossIndexCatalog, index: CrossIndex) {
        self.cross_indexes[catalog.slot()] = Some(index);
    }

    /// Reads a binary cross index, replacing any loaded for `catalog`.
    /// On error the previous table is kept.
    pub fn load_cross_index<R: Read>(
        &mut self,
        catalog: CrossIndexCatalog,
        reader: R,
    ) -> Result<usize> {
        let index = CrossIndex::read(reader)?;
        let n = index.len();
        log::info!("Loaded {} cross index with {} entries", catalog, n);
        self.add_cross_index(catalog, index);
        Ok(n)
    }

    pub fn cross_index(&self, catalog: CrossIndexCatalog) -> Option<&CrossIndex> {
        self.cross_indexes[catalog.slot()].as_ref()
    }

    /// Our catalog number for `number` in `catalog`.
    pub fn search_cross_index_for_catalog_number(
        &self,
        catalog: CrossIndexCatalog,
        number: u32,
    ) -> Option<CatalogNumber> {
        self.cross_index(catalog)?.lookup(number)
    }

    /// The star that `number` in `catalog` refers to, if it is loaded.
    pub fn search_cross_index(&self, catalog: CrossIndexCatalog, number: u32) -> Option<&Star> {
        self.search_cross_index_for_catalog_number(catalog, number)
            .and_then(|n| self.find(n))
    }

    // -- spatial queries -------------------------------------------------------

    /// Feeds `handler` every star visible from `view`. See
    /// [`StarOctree::process_visible_stars`].
    pub fn find_visible_stars<H>(
        &self,
        handler: &mut H,
        view: &ViewParams,
        stats: Option<&mut OctreeStats>,
    ) where
        H: StarHandler + ?Sized,
    {
        self.octree
            .process_visible_stars(self.index.stars(), view, handler, stats);
    }

    /// Feeds `handler` every star within `radius` light years of `position`.
    pub fn find_close_stars<H>(&self, handler: &mut H, position: &Vector3<f32>, radius: f32)
    where
        H: StarHandler + ?Sized,
    {
        self.octree
            .process_close_stars(self.index.stars(), position, radius, handler);
    }
}

/// `HIP n` for Hipparcos numbers, `TYC a-b-c` for everything else.
pub fn designation(catalog_number: CatalogNumber) -> String {
    if catalog_number <= MAX_HIPPARCOS_NUMBER {
        return format!("HIP {}", catalog_number);
    }
    let n = catalog_number as u64;
    let tyc3 = n / TYC3_FACTOR;
    let tyc2 = (n % TYC3_FACTOR) / TYC2_FACTOR;
    let tyc1 = n % TYC2_FACTOR;
    format!("TYC {}-{}-{}", tyc1, tyc2, tyc3)
}

/// Packs a `a-b-c` Tycho designation into a catalog number.
fn parse_tycho(text: &str) -> Option<CatalogNumber> {
    let mut parts = text.split('-').map(|p| p.trim().parse::<u64>().ok());
    let tyc1 = parts.next()??;
    let tyc2 = parts.next()??;
    let tyc3 = parts.next()??;
    if parts.next().is_some() || tyc1 >= TYC2_FACTOR || tyc2 >= TYC3_FACTOR / TYC2_FACTOR {
        return None;
    }
    let n = tyc3 * TYC3_FACTOR + tyc2 * TYC2_FACTOR + tyc1;
    CatalogNumber::try_from(n).ok()
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| name[prefix.len()..].trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::MemoryNameDatabase;
    use crate::star::StarDetails;
    use crate::xindex::CrossIndexEntry;

    fn star(n: CatalogNumber, x: f32, y: f32, z: f32) -> Star {
        Star::new(n, Vector3::new(x, y, z), 1.0, Arc::new(StarDetails::default()))
    }

    fn sample() -> StarDatabase {
        let stars = vec![
            star(7, 0.0, 0.0, -5.0),
            star(32349, 0.0, 0.0, -8.6),
            star(1_000_010_005, 3.0, 0.0, 0.0),
        ];
        let hd = CrossIndex::from_entries(vec![
            CrossIndexEntry {
                catalog_number: 48915,
                cel_catalog_number: 32349,
            },
            CrossIndexEntry {
                catalog_number: 10,
                cel_catalog_number: 999,
            },
        ]);
        StarDatabase::build(stars, [Some(hd), None, None], &OctreeConfig::default())
    }

    #[test]
    fn test_designations() {
        assert_eq!(designation(32349), "HIP 32349");
        assert_eq!(designation(999_999), "HIP 999999");
        assert_eq!(designation(1_000_010_005), "TYC 5-1-1");
        assert_eq!(designation(4_123_456_789), "TYC 6789-12345-4");
    }

    #[test]
    fn test_tycho_parse_inverts_designation() {
        assert_eq!(parse_tycho("6789-12345-4"), Some(4_123_456_789));
        assert_eq!(parse_tycho("5-1-1"), Some(1_000_010_005));
        assert_eq!(parse_tycho("5-1"), None);
        assert_eq!(parse_tycho("10000-1-1"), None);
        assert_eq!(parse_tycho("1-1-9"), None);
    }

    #[test]
    fn test_find_and_get() {
        let db = sample();
        assert_eq!(db.len(), 3);
        assert_eq!(db.find(32349).map(Star::catalog_number), Some(32349));
        assert!(db.find(8).is_none());
        assert_eq!(db.get(0).map(Star::catalog_number), Some(7));
    }

    #[test]
    fn test_find_by_designation() {
        let db = sample();
        assert_eq!(db.find_catalog_number_by_name("HIP 7", false), Some(7));
        assert_eq!(db.find_catalog_number_by_name("hip7", false), Some(7));
        assert_eq!(
            db.find_catalog_number_by_name("TYC 5-1-1", false),
            Some(1_000_010_005)
        );
        assert_eq!(db.find_catalog_number_by_name("HD 48915", false), Some(32349));
        assert_eq!(db.find_catalog_number_by_name("SAO 1", false), None);
        assert_eq!(db.find_catalog_number_by_name("Sirius", false), None);
        // In the cross index but not in this catalog
        assert_eq!(db.find_catalog_number_by_name("HD 10", false), Some(999));
        assert!(db.find_by_name("HD 10", false).is_none());
    }

    #[test]
    fn test_names_come_from_name_database() {
        let mut db = sample();
        let mut names = MemoryNameDatabase::new();
        names.add(32349, "Sirius");
        names.add(32349, "Alpha Canis Majoris");
        db.set_name_database(Arc::new(names));

        let sirius = db.find_by_name("sirius", false).unwrap();
        assert_eq!(sirius.catalog_number(), 32349);
        assert_eq!(db.star_name(sirius, false), "Sirius");
        assert_eq!(
            db.star_name_list(sirius, MAX_STAR_NAMES),
            "Sirius / Alpha Canis Majoris / HIP 32349 / HD 48915"
        );
        assert_eq!(db.star_name_list(sirius, 2), "Sirius / Alpha Canis Majoris");
        assert_eq!(db.completion("S", false), vec!["Sirius"]);

        let unnamed = db.find(7).unwrap();
        assert_eq!(db.star_name(unnamed, false), "HIP 7");
        assert_eq!(db.star_name_list(unnamed, MAX_STAR_NAMES), "HIP 7");
    }

    #[test]
    fn test_without_name_database() {
        let db = sample();
        let star = db.find(1_000_010_005).unwrap();
        assert_eq!(db.star_name(star, true), "TYC 5-1-1");
        assert!(db.completion("a", false).is_empty());
        assert!(db.name_database().is_none());
    }

    #[test]
    fn test_cross_index_search() {
        let mut db = sample();
        assert_eq!(
            db.search_cross_index(CrossIndexCatalog::HenryDraper, 48915)
                .map(Star::catalog_number),
            Some(32349)
        );
        assert!(db.search_cross_index(CrossIndexCatalog::HenryDraper, 1).is_none());
        assert!(db.search_cross_index(CrossIndexCatalog::Sao, 48915).is_none());

        let mut bytes = Vec::new();
        CrossIndex::from_entries(vec![CrossIndexEntry {
            catalog_number: 151881,
            cel_catalog_number: 7,
        }])
        .write(&mut bytes)
        .unwrap();
        assert_eq!(db.load_cross_index(CrossIndexCatalog::Sao, &bytes[..]).unwrap(), 1);
        assert_eq!(
            db.search_cross_index(CrossIndexCatalog::Sao, 151881)
                .map(Star::catalog_number),
            Some(7)
        );

        // A bad table leaves the loaded one in place
        assert!(db.load_cross_index(CrossIndexCatalog::Sao, &b"CELSTARS"[..]).is_err());
        assert!(db.cross_index(CrossIndexCatalog::Sao).is_some());
    }

    #[test]
    fn test_queries_delegate_to_octree() {
        let db = sample();
        let view = ViewParams {
            position: Vector3::zeros(),
            orientation: nalgebra::UnitQuaternion::identity(),
            fov_y: 1.0,
            aspect_ratio: 1.0,
            limiting_mag: 10.0,
        };
        let mut seen = Vec::new();
        db.find_visible_stars(
            &mut |s: &Star, _: f32, _: f32| seen.push(s.catalog_number()),
            &view,
            None,
        );
        seen.sort_unstable();
        assert_eq!(seen, vec![7, 32349]);

        let mut near = Vec::new();
        db.find_close_stars(
            &mut |s: &Star, _: f32, _: f32| near.push(s.catalog_number()),
            &Vector3::zeros(),
            5.0,
        );
        near.sort_unstable();
        assert_eq!(near, vec![7, 1_000_010_005]);
    }

    #[test]
    fn test_database_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StarDatabase>();
    }
}
