//! Star entries and the shared details record attached to them.
//!
//! A [`Star`] is deliberately small: catalog number, position, absolute
//! magnitude and an [`Arc`] to its [`StarDetails`]. Details are shared, so a
//! hundred thousand stars decoded from one binary file with the same packed
//! spectral class all point at one allocation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Catalog number of a star. Unique within one finalized catalog.
pub type CatalogNumber = u32;

/// Reserved marker; never a valid catalog number.
pub const INVALID_CATALOG_NUMBER: CatalogNumber = u32::MAX;

/// Any star with a catalog number above this is assumed not to be a
/// Hipparcos star.
pub const MAX_HIPPARCOS_NUMBER: CatalogNumber = 999_999;

/// Light years in one parsec.
pub const LY_PER_PARSEC: f32 = 3.26167;

/// Apparent magnitude of a star with absolute magnitude `abs_mag` seen from
/// `distance_ly` light years.
#[inline]
pub fn abs_to_app_mag(abs_mag: f32, distance_ly: f32) -> f32 {
    abs_mag - 5.0 + 5.0 * (distance_ly / LY_PER_PARSEC).log10()
}

/// Absolute magnitude of a star with apparent magnitude `app_mag` at
/// `distance_ly` light years.
#[inline]
pub fn app_to_abs_mag(app_mag: f32, distance_ly: f32) -> f32 {
    app_mag + 5.0 - 5.0 * (distance_ly / LY_PER_PARSEC).log10()
}

/// A typed value in a text record or a details record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Vector([f64; 3]),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            FieldValue::Vector(v) => Some(*v),
            _ => None,
        }
    }
}

/// Physical, spectral and orbital attributes of a star.
///
/// The catalog treats this as opaque: it is built from whatever attributes a
/// source supplies and handed back untouched. Instances are shared between
/// stars through [`Arc`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarDetails {
    spectral_type: Option<String>,
    attributes: BTreeMap<String, FieldValue>,
    barycenter: bool,
}

impl StarDetails {
    pub fn new(spectral_type: Option<String>, attributes: BTreeMap<String, FieldValue>) -> Self {
        Self {
            spectral_type,
            attributes,
            barycenter: false,
        }
    }

    /// Details of an invisible barycenter pseudo-star.
    pub fn barycenter() -> Self {
        Self {
            spectral_type: None,
            attributes: BTreeMap::new(),
            barycenter: true,
        }
    }

    pub fn spectral_type(&self) -> Option<&str> {
        self.spectral_type.as_deref()
    }

    pub fn attribute(&self, key: &str) -> Option<&FieldValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, FieldValue> {
        &self.attributes
    }

    pub fn is_barycenter(&self) -> bool {
        self.barycenter
    }

    /// Returns a copy of `self` with `other`'s spectral type and attributes
    /// laid over it. Keys missing from `other` keep their current value.
    pub fn overlaid_with(&self, other: &StarDetails) -> StarDetails {
        let mut merged = self.clone();
        if other.spectral_type.is_some() {
            merged.spectral_type = other.spectral_type.clone();
        }
        for (key, value) in &other.attributes {
            merged.attributes.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// One entry of the star catalog.
#[derive(Debug, Clone)]
pub struct Star {
    catalog_number: CatalogNumber,
    position: Vector3<f32>,
    abs_mag: f32,
    details: Arc<StarDetails>,
}

impl Star {
    pub fn new(
        catalog_number: CatalogNumber,
        position: Vector3<f32>,
        abs_mag: f32,
        details: Arc<StarDetails>,
    ) -> Self {
        Self {
            catalog_number,
            position,
            abs_mag,
            details,
        }
    }

    pub fn catalog_number(&self) -> CatalogNumber {
        self.catalog_number
    }

    /// Position in catalog space, in light years.
    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn absolute_magnitude(&self) -> f32 {
        self.abs_mag
    }

    /// Apparent magnitude as seen from `viewer`.
    pub fn apparent_magnitude_from(&self, viewer: &Vector3<f32>) -> f32 {
        abs_to_app_mag(self.abs_mag, (self.position - viewer).norm())
    }

    pub fn details(&self) -> &Arc<StarDetails> {
        &self.details
    }

    pub fn is_barycenter(&self) -> bool {
        self.details.is_barycenter()
    }

    pub(crate) fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
    }

    pub(crate) fn set_absolute_magnitude(&mut self, abs_mag: f32) {
        self.abs_mag = abs_mag;
    }

    pub(crate) fn set_details(&mut self, details: Arc<StarDetails>) {
        self.details = details;
    }
}

impl fmt::Display for Star {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} at ({:.4}, {:.4}, {:.4}) ly, M={:.2}",
            self.catalog_number,
            self.position.x,
            self.position.y,
            self.position.z,
            self.abs_mag
        )
    }
}
