//! Two-phase star database loading.
//!
//! A [`StarLoader`] collects stars from any number of sources and then
//! [`finish`](StarLoader::finish)es into an immutable [`StarDatabase`]:
//!
//! 1. **Collect**: [`load_binary`](StarLoader::load_binary) establishes the
//!    baseline catalog, then [`load_record`](StarLoader::load_record) applies
//!    text records in order. Later records may add stars or amend earlier ones.
//! 2. **Resolve**: stars positioned relative to a barycenter are deferred
//!    while collecting, since the barycenter may not have been seen yet. At
//!    finish time the worklist is drained.
//! 3. **Freeze**: stars are sorted by catalog number into one array, and the
//!    catalog index and octree are built over it.
//!
//! While collecting, lookups go through a hash map over the unsorted working
//! set; it is dropped once the sorted array exists.

pub mod binary;
pub mod details;
pub mod record;

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use nalgebra::Vector3;

use crate::database::StarDatabase;
use crate::error::{Error, Result};
use crate::octree::OctreeConfig;
use crate::star::{app_to_abs_mag, CatalogNumber, Star, INVALID_CATALOG_NUMBER};
use crate::xindex::{CrossIndex, CrossIndexCatalog};

pub use binary::{read_star_file, write_star_file, BinaryStarRecord};
pub use details::DetailsRegistry;
pub use record::{Disposition, FieldMap, StcRecord};

use record::{
    Magnitude, RecordGeometry, FIELD_ABS_MAG, FIELD_APP_MAG, FIELD_BARYCENTER, FIELD_CATALOG_REF,
    FIELD_POSITION,
};

/// First automatically assigned catalog number; later ones count down.
pub const FIRST_AUTO_CATALOG_NUMBER: CatalogNumber = 0xffff_fffe;

/// A star whose position is an offset from another star, not yet resolved.
#[derive(Debug, Clone, Copy)]
struct BarycenterUsage {
    catalog_number: CatalogNumber,
    barycenter: CatalogNumber,
    /// Apparent magnitude to convert once the true distance is known.
    app_mag: Option<f32>,
}

/// Outcome of applying a batch of text records.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub accepted: Vec<CatalogNumber>,
    /// Rejected records as `(position in batch, reason)`.
    pub rejected: Vec<(usize, Error)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Outcome of [`StarLoader::finish`].
#[derive(Debug, Default)]
pub struct FinishReport {
    /// Stars in the finished catalog.
    pub star_count: usize,
    /// Stars dropped because their barycenter never resolved.
    pub failed: Vec<Error>,
}

/// Position, magnitude and pending work computed for a new or replaced star.
struct InitialState {
    position: Vector3<f32>,
    abs_mag: f32,
    usage: Option<(CatalogNumber, Option<f32>)>,
}

/// Collects stars for one load session.
pub struct StarLoader {
    stars: Vec<Star>,
    working_index: HashMap<CatalogNumber, usize>,
    barycenters: Vec<BarycenterUsage>,
    next_auto_catalog_number: Option<CatalogNumber>,
    max_explicit_catalog_number: Option<CatalogNumber>,
    details: DetailsRegistry,
    cross_indexes: [Option<CrossIndex>; 3],
    text_loaded: bool,
}

impl Default for StarLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StarLoader {
    pub fn new() -> Self {
        Self::with_details(DetailsRegistry::new())
    }

    /// A loader that resolves binary details indexes through `details`.
    pub fn with_details(details: DetailsRegistry) -> Self {
        Self {
            stars: Vec::new(),
            working_index: HashMap::new(),
            barycenters: Vec::new(),
            next_auto_catalog_number: Some(FIRST_AUTO_CATALOG_NUMBER),
            max_explicit_catalog_number: None,
            details,
            cross_indexes: [None, None, None],
            text_loaded: false,
        }
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Looks a star up in the unsorted working set.
    pub fn find_while_loading(&self, catalog_number: CatalogNumber) -> Option<&Star> {
        self.working_index
            .get(&catalog_number)
            .map(|&idx| &self.stars[idx])
    }

    /// Number of stars still waiting on a barycenter.
    pub fn pending_barycenters(&self) -> usize {
        self.barycenters.len()
    }

    pub fn add_cross_index(&mut self, catalog: CrossIndexCatalog, index: CrossIndex) {
        self.cross_indexes[catalog.slot()] = Some(index);
    }

    /// Reads a binary cross index. Records loaded afterwards may name
    /// themselves through it with a `CatalogRef` field.
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

    /// Loads stars from a binary star file. Returns the number of stars added.
    ///
    /// Must come before any text record. On a format error nothing is added.
    /// Records repeating a catalog number already loaded are skipped.
    pub fn load_binary<R: Read>(&mut self, reader: R) -> Result<usize> {
        if self.text_loaded {
            return Err(Error::LoadOrder);
        }

        let records = read_star_file(reader)?;
        let total = records.len();
        let mut added = 0;
        for record in records {
            if record.catalog_number == INVALID_CATALOG_NUMBER {
                log::warn!("Skipping binary star with reserved catalog number");
                continue;
            }
            if self.working_index.contains_key(&record.catalog_number) {
                log::warn!(
                    "Skipping duplicate binary star {}",
                    record.catalog_number
                );
                continue;
            }
            let details = self.details.packed(record.details_index);
            self.insert(
                Star::new(
                    record.catalog_number,
                    record.position,
                    record.abs_mag,
                    details,
                ),
                true,
            );
            added += 1;
        }

        log::info!("Loaded {} of {} binary star records", added, total);
        Ok(added)
    }

    /// Memory-maps and loads a binary star file.
    pub fn load_binary_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let file = std::fs::File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        self.load_binary(&mmap[..])
    }

    /// Applies a batch of text records in order, collecting per-record errors.
    pub fn load_records<'a, I>(&mut self, records: I) -> LoadReport
    where
        I: IntoIterator<Item = &'a StcRecord>,
    {
        let mut report = LoadReport::default();
        for (i, record) in records.into_iter().enumerate() {
            match self.load_record(record) {
                Ok(catalog_number) => report.accepted.push(catalog_number),
                Err(err) => {
                    log::warn!("Rejected star record #{}: {}", i, err);
                    report.rejected.push((i, err));
                }
            }
        }
        log::info!(
            "Applied {} star records ({} rejected)",
            report.accepted.len(),
            report.rejected.len()
        );
        report
    }

    /// Applies one text record and returns the catalog number it touched.
    ///
    /// A failing record leaves the loader as it was.
    pub fn load_record(&mut self, record: &StcRecord) -> Result<CatalogNumber> {
        let catalog_number = self.apply_record(record)?;
        self.text_loaded = true;
        Ok(catalog_number)
    }

    fn apply_record(&mut self, record: &StcRecord) -> Result<CatalogNumber> {
        let geometry = RecordGeometry::extract(record)?;
        let catalog_number = self.record_catalog_number(record, &geometry)?;

        match record.disposition {
            Disposition::Add => self.add_star(catalog_number, record.is_barycenter, geometry),
            Disposition::Modify | Disposition::Replace => {
                let catalog_number = catalog_number.ok_or(Error::MissingCatalogNumber {
                    action: record.disposition.verb(),
                })?;
                let idx = *self.working_index.get(&catalog_number).ok_or(
                    Error::UnknownCatalogNumber {
                        action: record.disposition.verb(),
                        catalog_number,
                    },
                )?;
                if record.disposition == Disposition::Modify {
                    self.modify_star(idx, record.is_barycenter, geometry)?;
                } else {
                    self.replace_star(idx, record.is_barycenter, geometry)?;
                }
                Ok(catalog_number)
            }
        }
    }

    /// Resolves barycenters, drops stars that cannot be placed, and builds
    /// the database with default octree settings.
    pub fn finish(self) -> (StarDatabase, FinishReport) {
        self.finish_with_config(&OctreeConfig::default())
    }

    pub fn finish_with_config(mut self, config: &OctreeConfig) -> (StarDatabase, FinishReport) {
        let (dropped, failed): (HashSet<CatalogNumber>, Vec<Error>) =
            self.resolve_barycenters().into_iter().unzip();

        let mut stars = std::mem::take(&mut self.stars);
        stars.retain(|s| !dropped.contains(&s.catalog_number()));
        stars.sort_unstable_by_key(Star::catalog_number);

        let report = FinishReport {
            star_count: stars.len(),
            failed,
        };
        log::info!(
            "Finished star catalog: {} stars, {} dropped",
            report.star_count,
            report.failed.len()
        );

        let database = StarDatabase::build(stars, self.cross_indexes, config);
        (database, report)
    }

    fn record_catalog_number(
        &self,
        record: &StcRecord,
        geometry: &RecordGeometry,
    ) -> Result<Option<CatalogNumber>> {
        let referenced = match &geometry.catalog_ref {
            Some(reference) => {
                let (catalog, number) = CrossIndexCatalog::parse_designation(reference)
                    .ok_or_else(|| {
                        Error::malformed(
                            FIELD_CATALOG_REF,
                            format!("unrecognized designation '{}'", reference),
                        )
                    })?;
                let resolved = self.cross_indexes[catalog.slot()]
                    .as_ref()
                    .and_then(|index| index.lookup(number));
                if resolved.is_none() {
                    log::debug!("Catalog reference {} not in any loaded cross index", reference);
                }
                resolved
            }
            None => None,
        };

        let catalog_number = match (record.catalog_number, referenced) {
            (Some(declared), Some(resolved)) if declared != resolved => {
                return Err(Error::CrossIndexMismatch {
                    reference: geometry.catalog_ref.clone().unwrap_or_default(),
                    resolved,
                    declared,
                })
            }
            (Some(declared), _) => Some(declared),
            (None, resolved) => resolved,
        };

        if catalog_number == Some(INVALID_CATALOG_NUMBER) {
            return Err(Error::ReservedCatalogNumber(INVALID_CATALOG_NUMBER));
        }
        Ok(catalog_number)
    }

    fn add_star(
        &mut self,
        catalog_number: Option<CatalogNumber>,
        is_barycenter: bool,
        geometry: RecordGeometry,
    ) -> Result<CatalogNumber> {
        if let Some(n) = catalog_number {
            if self.working_index.contains_key(&n) {
                return Err(Error::DuplicateCatalogNumber(n));
            }
        }
        let state = self.initial_state(catalog_number, is_barycenter, &geometry)?;

        let (catalog_number, explicit) = match catalog_number {
            Some(n) => (n, true),
            None => (self.peek_auto_catalog_number()?, false),
        };
        if state.usage.is_some_and(|(barycenter, _)| barycenter == catalog_number) {
            return Err(Error::malformed(FIELD_BARYCENTER, "star cannot orbit itself"));
        }

        let details = if is_barycenter {
            self.details.barycenter()
        } else {
            Arc::new(geometry.details)
        };
        if !explicit {
            self.next_auto_catalog_number = catalog_number.checked_sub(1);
        }
        self.insert(
            Star::new(catalog_number, state.position, state.abs_mag, details),
            explicit,
        );
        self.push_usage(catalog_number, state.usage);
        Ok(catalog_number)
    }

    fn replace_star(
        &mut self,
        idx: usize,
        is_barycenter: bool,
        geometry: RecordGeometry,
    ) -> Result<()> {
        let catalog_number = self.stars[idx].catalog_number();
        let state = self.initial_state(Some(catalog_number), is_barycenter, &geometry)?;

        let details = if is_barycenter {
            self.details.barycenter()
        } else {
            Arc::new(geometry.details)
        };
        self.drop_usage(catalog_number);
        self.stars[idx] = Star::new(catalog_number, state.position, state.abs_mag, details);
        self.push_usage(catalog_number, state.usage);
        Ok(())
    }

    fn modify_star(
        &mut self,
        idx: usize,
        is_barycenter: bool,
        geometry: RecordGeometry,
    ) -> Result<()> {
        let star = &self.stars[idx];
        let catalog_number = star.catalog_number();
        if geometry.barycenter == Some(catalog_number) {
            return Err(Error::malformed(FIELD_BARYCENTER, "star cannot orbit itself"));
        }

        // Work out the new state first so a bad field leaves the star untouched.
        let existing_usage = self.barycenter_of(catalog_number);
        let (position, barycenter) = match (geometry.barycenter, geometry.position) {
            (Some(barycenter), offset) => {
                (offset.unwrap_or_else(Vector3::zeros), Some(barycenter))
            }
            (None, Some(position)) => (position, None),
            (None, None) => (star.position(), existing_usage),
        };

        let mut abs_mag = star.absolute_magnitude();
        let mut pending_app_mag = self
            .barycenters
            .iter()
            .find(|u| u.catalog_number == catalog_number)
            .and_then(|u| u.app_mag);
        match geometry.magnitude {
            Some(Magnitude::Absolute(m)) => {
                abs_mag = m;
                pending_app_mag = None;
            }
            Some(Magnitude::Apparent(m)) if barycenter.is_some() => pending_app_mag = Some(m),
            Some(Magnitude::Apparent(m)) => {
                abs_mag = absolute_from_apparent(m, &position)?;
                pending_app_mag = None;
            }
            None if barycenter.is_none() && pending_app_mag.is_some() => {
                // The star was given a fixed position; settle its pending magnitude now.
                abs_mag = absolute_from_apparent(pending_app_mag.unwrap_or(abs_mag), &position)?;
                pending_app_mag = None;
            }
            None => {}
        }

        let details = if is_barycenter {
            self.details.barycenter()
        } else if geometry.details.spectral_type().is_none()
            && geometry.details.attributes().is_empty()
        {
            star.details().clone()
        } else {
            Arc::new(star.details().overlaid_with(&geometry.details))
        };

        self.drop_usage(catalog_number);
        let star = &mut self.stars[idx];
        star.set_position(position);
        star.set_absolute_magnitude(abs_mag);
        star.set_details(details);
        if let Some(barycenter) = barycenter {
            self.push_usage(catalog_number, Some((barycenter, pending_app_mag)));
        }
        Ok(())
    }

    fn initial_state(
        &self,
        catalog_number: Option<CatalogNumber>,
        is_barycenter: bool,
        geometry: &RecordGeometry,
    ) -> Result<InitialState> {
        if catalog_number.is_some() && geometry.barycenter == catalog_number {
            return Err(Error::malformed(FIELD_BARYCENTER, "star cannot orbit itself"));
        }

        let position = match (geometry.position, geometry.barycenter) {
            (Some(position), _) => position,
            (None, Some(_)) => Vector3::zeros(),
            (None, None) => return Err(Error::MissingField(FIELD_POSITION)),
        };

        let (abs_mag, app_mag) = match (geometry.magnitude, geometry.barycenter) {
            (Some(Magnitude::Absolute(m)), _) => (m, None),
            (Some(Magnitude::Apparent(m)), Some(_)) => (m, Some(m)),
            (Some(Magnitude::Apparent(m)), None) => (absolute_from_apparent(m, &position)?, None),
            (None, _) if is_barycenter => (f32::INFINITY, None),
            (None, _) => return Err(Error::MissingField(FIELD_ABS_MAG)),
        };

        Ok(InitialState {
            position,
            abs_mag,
            usage: geometry.barycenter.map(|b| (b, app_mag)),
        })
    }

    /// The next automatic number, without claiming it.
    fn peek_auto_catalog_number(&self) -> Result<CatalogNumber> {
        let candidate = self
            .next_auto_catalog_number
            .ok_or(Error::CatalogNumbersExhausted(0))?;
        let collides = self.working_index.contains_key(&candidate)
            || self
                .max_explicit_catalog_number
                .is_some_and(|max| candidate <= max);
        if collides {
            return Err(Error::CatalogNumbersExhausted(candidate));
        }
        Ok(candidate)
    }

    fn insert(&mut self, star: Star, explicit: bool) {
        let catalog_number = star.catalog_number();
        if explicit {
            self.max_explicit_catalog_number = Some(
                self.max_explicit_catalog_number
                    .map_or(catalog_number, |max| max.max(catalog_number)),
            );
        }
        self.working_index.insert(catalog_number, self.stars.len());
        self.stars.push(star);
    }

    fn barycenter_of(&self, catalog_number: CatalogNumber) -> Option<CatalogNumber> {
        self.barycenters
            .iter()
            .find(|u| u.catalog_number == catalog_number)
            .map(|u| u.barycenter)
    }

    fn push_usage(
        &mut self,
        catalog_number: CatalogNumber,
        usage: Option<(CatalogNumber, Option<f32>)>,
    ) {
        if let Some((barycenter, app_mag)) = usage {
            self.barycenters.push(BarycenterUsage {
                catalog_number,
                barycenter,
                app_mag,
            });
        }
    }

    fn drop_usage(&mut self, catalog_number: CatalogNumber) {
        self.barycenters.retain(|u| u.catalog_number != catalog_number);
    }

    /// Drains the barycenter worklist. A usage resolves once its barycenter
    /// exists and has itself been placed, so chains settle in dependency
    /// order regardless of record order. Returns one error per star that
    /// could not be placed, including stars whose deferred apparent
    /// magnitude lands at zero distance.
    fn resolve_barycenters(&mut self) -> Vec<(CatalogNumber, Error)> {
        let mut remaining = std::mem::take(&mut self.barycenters);
        let mut failed: HashSet<CatalogNumber> = HashSet::new();
        let mut errors = Vec::new();

        loop {
            let waiting: HashSet<CatalogNumber> =
                remaining.iter().map(|u| u.catalog_number).collect();
            let mut deferred = Vec::new();
            let mut progressed = false;

            for usage in remaining {
                let barycenter_idx = match self.working_index.get(&usage.barycenter) {
                    Some(&idx) if !failed.contains(&usage.barycenter) => idx,
                    _ => {
                        failed.insert(usage.catalog_number);
                        errors.push((usage.catalog_number, unresolved(&usage)));
                        progressed = true;
                        continue;
                    }
                };
                if waiting.contains(&usage.barycenter) {
                    deferred.push(usage);
                    continue;
                }

                let origin = self.stars[barycenter_idx].position();
                let star = &mut self.stars[self.working_index[&usage.catalog_number]];
                let position = origin + star.position();
                progressed = true;
                if let Some(app_mag) = usage.app_mag {
                    match absolute_from_apparent(app_mag, &position) {
                        Ok(abs_mag) => star.set_absolute_magnitude(abs_mag),
                        Err(err) => {
                            failed.insert(usage.catalog_number);
                            errors.push((usage.catalog_number, err));
                            continue;
                        }
                    }
                }
                star.set_position(position);
            }

            remaining = deferred;
            if remaining.is_empty() {
                break;
            }
            if !progressed {
                // Whatever is left waits on a cycle.
                for usage in &remaining {
                    errors.push((usage.catalog_number, unresolved(usage)));
                }
                break;
            }
        }

        for (catalog_number, err) in &errors {
            log::warn!("Dropping star {}: {}", catalog_number, err);
        }
        errors
    }
}

fn unresolved(usage: &BarycenterUsage) -> Error {
    Error::UnresolvedBarycenter {
        star: usage.catalog_number,
        barycenter: usage.barycenter,
    }
}

fn absolute_from_apparent(app_mag: f32, position: &Vector3<f32>) -> Result<f32> {
    let distance = position.norm();
    if distance <= 0.0 {
        return Err(Error::malformed(
            FIELD_APP_MAG,
            "apparent magnitude needs a nonzero distance",
        ));
    }
    Ok(app_to_abs_mag(app_mag, distance))
}
