//! Text star records.
//!
//! The record syntax itself is parsed elsewhere; what arrives here is a
//! [`StcRecord`]: a disposition, an optional catalog number and a bag of
//! typed fields. This module pulls the handful of fields the catalog cares
//! about out of that bag and leaves the rest for the details record.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::star::{CatalogNumber, FieldValue, StarDetails};

pub type FieldMap = BTreeMap<String, FieldValue>;

pub const FIELD_POSITION: &str = "Position";
pub const FIELD_RA: &str = "RA";
pub const FIELD_DEC: &str = "Dec";
pub const FIELD_DISTANCE: &str = "Distance";
pub const FIELD_BARYCENTER: &str = "OrbitBarycenter";
pub const FIELD_ABS_MAG: &str = "AbsMag";
pub const FIELD_APP_MAG: &str = "AppMag";
pub const FIELD_CATALOG_REF: &str = "CatalogRef";
pub const FIELD_SPECTRAL_TYPE: &str = "SpectralType";

const GEOMETRY_FIELDS: [&str; 8] = [
    FIELD_POSITION,
    FIELD_RA,
    FIELD_DEC,
    FIELD_DISTANCE,
    FIELD_BARYCENTER,
    FIELD_ABS_MAG,
    FIELD_APP_MAG,
    FIELD_CATALOG_REF,
];

/// How a record combines with an existing star of the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Disposition {
    /// Create a new star; the number must not be in use.
    #[default]
    Add,
    /// Amend an existing star, overlaying its details.
    Modify,
    /// Rebuild an existing star from scratch, keeping only its number.
    Replace,
}

impl Disposition {
    pub(crate) fn verb(self) -> &'static str {
        match self {
            Disposition::Add => "add",
            Disposition::Modify => "modify",
            Disposition::Replace => "replace",
        }
    }
}

/// One parsed text record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StcRecord {
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default)]
    pub catalog_number: Option<CatalogNumber>,
    /// Declares an invisible barycenter rather than a star.
    #[serde(default)]
    pub is_barycenter: bool,
    #[serde(default)]
    pub fields: FieldMap,
}

impl StcRecord {
    pub fn new(disposition: Disposition, catalog_number: Option<CatalogNumber>) -> Self {
        Self {
            disposition,
            catalog_number,
            is_barycenter: false,
            fields: FieldMap::new(),
        }
    }

    pub fn barycenter(catalog_number: Option<CatalogNumber>) -> Self {
        Self {
            is_barycenter: true,
            ..Self::new(Disposition::Add, catalog_number)
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: &str, value: FieldValue) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn with_position(self, x: f64, y: f64, z: f64) -> Self {
        self.with(FIELD_POSITION, FieldValue::Vector([x, y, z]))
    }

    pub fn with_abs_mag(self, abs_mag: f64) -> Self {
        self.with(FIELD_ABS_MAG, FieldValue::Number(abs_mag))
    }

    pub fn with_barycenter(self, barycenter: CatalogNumber) -> Self {
        self.with(FIELD_BARYCENTER, FieldValue::Number(barycenter as f64))
    }
}

/// Brightness as given by a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Magnitude {
    Absolute(f32),
    Apparent(f32),
}

/// The catalog-relevant content of an [`StcRecord`], validated.
#[derive(Debug, Clone)]
pub(crate) struct RecordGeometry {
    /// Absolute position, or offset from `barycenter` when one is set.
    pub position: Option<Vector3<f32>>,
    pub barycenter: Option<CatalogNumber>,
    pub magnitude: Option<Magnitude>,
    pub catalog_ref: Option<String>,
    pub details: StarDetails,
}

impl RecordGeometry {
    pub fn extract(record: &StcRecord) -> Result<Self> {
        let fields = &record.fields;

        let position = match fields.get(FIELD_POSITION) {
            Some(value) => Some(vector_field(FIELD_POSITION, value)?),
            None => spherical_position(fields)?,
        };

        let barycenter = fields
            .get(FIELD_BARYCENTER)
            .map(|v| catalog_number_field(FIELD_BARYCENTER, v))
            .transpose()?;

        let magnitude = match (fields.get(FIELD_ABS_MAG), fields.get(FIELD_APP_MAG)) {
            (Some(abs), _) => Some(Magnitude::Absolute(number_field(FIELD_ABS_MAG, abs)?)),
            (None, Some(app)) => Some(Magnitude::Apparent(number_field(FIELD_APP_MAG, app)?)),
            (None, None) => None,
        };

        let catalog_ref = fields
            .get(FIELD_CATALOG_REF)
            .map(|v| {
                v.as_text()
                    .map(str::to_string)
                    .ok_or_else(|| Error::malformed(FIELD_CATALOG_REF, "expected text"))
            })
            .transpose()?;

        let details = if record.is_barycenter {
            StarDetails::barycenter()
        } else {
            let spectral_type = fields
                .get(FIELD_SPECTRAL_TYPE)
                .and_then(FieldValue::as_text)
                .map(str::to_string);
            let attributes = fields
                .iter()
                .filter(|(k, _)| !GEOMETRY_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            StarDetails::new(spectral_type, attributes)
        };

        Ok(Self {
            position,
            barycenter,
            magnitude,
            catalog_ref,
            details,
        })
    }
}

fn number_field(key: &str, value: &FieldValue) -> Result<f32> {
    let n = value
        .as_number()
        .ok_or_else(|| Error::malformed(key, "expected a number"))?;
    if !n.is_finite() {
        return Err(Error::malformed(key, format!("{} is not finite", n)));
    }
    Ok(n as f32)
}

fn catalog_number_field(key: &str, value: &FieldValue) -> Result<CatalogNumber> {
    let n = value
        .as_number()
        .ok_or_else(|| Error::malformed(key, "expected a catalog number"))?;
    if n.fract() != 0.0 || n < 0.0 || n >= u32::MAX as f64 {
        return Err(Error::malformed(key, format!("{} is not a catalog number", n)));
    }
    Ok(n as CatalogNumber)
}

fn vector_field(key: &str, value: &FieldValue) -> Result<Vector3<f32>> {
    let v = value
        .as_vector()
        .ok_or_else(|| Error::malformed(key, "expected a 3-vector"))?;
    if v.iter().any(|c| !c.is_finite()) {
        return Err(Error::malformed(key, format!("{:?} is not finite", v)));
    }
    Ok(Vector3::new(v[0] as f32, v[1] as f32, v[2] as f32))
}

/// Equatorial RA/Dec (degrees) and distance (ly) to Cartesian light years:
/// +x toward RA 0h, +z toward the north celestial pole.
fn spherical_position(fields: &FieldMap) -> Result<Option<Vector3<f32>>> {
    let (ra, dec, distance) = match (
        fields.get(FIELD_RA),
        fields.get(FIELD_DEC),
        fields.get(FIELD_DISTANCE),
    ) {
        (None, None, None) => return Ok(None),
        (Some(ra), Some(dec), Some(distance)) => (
            number_field(FIELD_RA, ra)? as f64,
            number_field(FIELD_DEC, dec)? as f64,
            number_field(FIELD_DISTANCE, distance)? as f64,
        ),
        (None, _, _) => return Err(Error::MissingField(FIELD_RA)),
        (_, None, _) => return Err(Error::MissingField(FIELD_DEC)),
        (_, _, None) => return Err(Error::MissingField(FIELD_DISTANCE)),
    };

    if !(-90.0..=90.0).contains(&dec) {
        return Err(Error::malformed(FIELD_DEC, format!("{} outside [-90, 90]", dec)));
    }
    if distance < 0.0 {
        return Err(Error::malformed(FIELD_DISTANCE, "negative distance"));
    }

    let (sin_ra, cos_ra) = ra.to_radians().sin_cos();
    let (sin_dec, cos_dec) = dec.to_radians().sin_cos();
    Ok(Some(Vector3::new(
        (distance * cos_dec * cos_ra) as f32,
        (distance * cos_dec * sin_ra) as f32,
        (distance * sin_dec) as f32,
    )))
}
