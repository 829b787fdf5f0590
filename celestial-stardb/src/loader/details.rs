//! Shared details records for stars decoded from binary files.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::star::{FieldValue, StarDetails};

/// Attribute under which a binary record's details index is kept.
pub const PACKED_DETAILS_ATTRIBUTE: &str = "PackedDetails";

/// Hands out one shared [`StarDetails`] per binary details index.
///
/// Binary files store only a 16-bit index per star; every star with the same
/// index shares the same record. Callers that know how to decode the index
/// (spectral class tables and the like) can [`register`](Self::register)
/// richer records before loading.
#[derive(Debug, Default)]
pub struct DetailsRegistry {
    by_index: HashMap<u16, Arc<StarDetails>>,
    barycenter: Option<Arc<StarDetails>>,
}

impl DetailsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, index: u16, details: Arc<StarDetails>) {
        self.by_index.insert(index, details);
    }

    /// The shared record for `index`, created on first use.
    pub fn packed(&mut self, index: u16) -> Arc<StarDetails> {
        self.by_index
            .entry(index)
            .or_insert_with(|| {
                let mut attributes = BTreeMap::new();
                attributes.insert(
                    PACKED_DETAILS_ATTRIBUTE.to_string(),
                    FieldValue::Number(index as f64),
                );
                Arc::new(StarDetails::new(None, attributes))
            })
            .clone()
    }

    /// The one record shared by all barycenter pseudo-stars.
    pub fn barycenter(&mut self) -> Arc<StarDetails> {
        self.barycenter
            .get_or_insert_with(|| Arc::new(StarDetails::barycenter()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}
