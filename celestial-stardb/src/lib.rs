//! In-memory star catalog with catalog-number, name and spatial lookups.
//!
//! Stars are collected by a [`StarLoader`] from a binary star file and any
//! number of text records, then frozen into a [`StarDatabase`]: one array
//! sorted by catalog number, a [`CatalogIndex`] over it, and a
//! [`StarOctree`] for visibility and proximity queries. Cross indexes map
//! HD, SAO and Gliese numbers onto catalog numbers.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`loader`] | [`StarLoader`], binary star file codec, [`StcRecord`] text records, barycenter resolution |
//! | [`index`] | [`CatalogIndex`], bisection lookup by catalog number |
//! | [`octree`] | [`StarOctree`], [`ViewParams`], visible and close star walks |
//! | [`xindex`] | [`CrossIndex`] tables, `CELINDEX` codec and ASCII converter |
//! | [`database`] | [`StarDatabase`] façade, star names and designations |
//! | [`names`] | [`StarNameDatabase`] trait and [`MemoryNameDatabase`] |
//! | [`star`] | [`Star`], [`StarDetails`], magnitude conversions |
//!
//! # Quick Start
//!
//! ```ignore
//! use celestial_stardb::{StarLoader, StcRecord, Disposition, ViewParams};
//!
//! let mut loader = StarLoader::new();
//! loader.load_binary_file("stars.dat")?;
//! loader.load_record(
//!     &StcRecord::new(Disposition::Add, Some(71683))
//!         .with_position(-1.6, -1.4, -3.8)
//!         .with_abs_mag(4.38),
//! )?;
//! let (db, report) = loader.finish();
//!
//! db.find_visible_stars(
//!     &mut |star: &Star, distance: f32, app_mag: f32| {
//!         println!("{} at {:.1} ly, mag {:.2}", star.catalog_number(), distance, app_mag);
//!     },
//!     &view,
//!     None,
//! );
//! ```
//!
//! # Binary Formats
//!
//! Star files start with `CELSTARS`, a `u16` version `0x0100` and a `u32`
//! record count, followed by 20-byte records. Cross index files start with
//! `CELINDEX` and a `u16` version, followed by `(u32, u32)` pairs until end
//! of file. All integers are little-endian. See [`loader::binary`] and
//! [`xindex`].
//!
//! # Features
//!
//! - **`cli`**: Enables the `make-xindex` and `query-stardb` binaries.

pub mod database;
pub mod error;
pub mod index;
pub mod loader;
pub mod names;
pub mod octree;
pub mod star;
pub mod xindex;

pub use database::{designation, StarDatabase, MAX_STAR_NAMES};
pub use error::{Error, ErrorKind, Result};
pub use index::CatalogIndex;
pub use loader::{
    BinaryStarRecord, DetailsRegistry, Disposition, FieldMap, FinishReport, LoadReport, StarLoader,
    StcRecord,
};
pub use names::{MemoryNameDatabase, StarNameDatabase};
pub use octree::{OctreeConfig, OctreeStats, StarHandler, StarOctree, ViewParams};
pub use star::{CatalogNumber, FieldValue, Star, StarDetails, INVALID_CATALOG_NUMBER};
pub use xindex::{CrossIndex, CrossIndexCatalog, CrossIndexEntry};
