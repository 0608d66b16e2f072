//! Editable feature layers.
//!
//! [`EditableLayer`] is the host's view of a vector layer with a transactional
//! edit buffer. [`MemoryLayer`] is an in-process implementation used by the
//! command line tool and tests.

use std::collections::BTreeMap;

use crate::crs::CrsId;
use crate::geometry::{BBox, Geometry};

pub type FeatureId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// An edit was requested outside of `begin_edit` / `commit`.
    NotEditing,
    AlreadyEditing,
    UnknownFeature(FeatureId),
    /// Host-specific failure.
    Backend(String),
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotEditing => write!(f, "layer is not in edit mode"),
            Self::AlreadyEditing => write!(f, "layer is already in edit mode"),
            Self::UnknownFeature(id) => write!(f, "no feature with id {id}"),
            Self::Backend(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LayerError {}

pub trait EditableLayer {
    fn name(&self) -> &str;

    fn crs(&self) -> &CrsId;

    /// Features whose bounding box intersects `rect` (in the layer CRS).
    fn features_in(&self, rect: &BBox) -> BTreeMap<FeatureId, Geometry>;

    fn begin_edit(&mut self) -> Result<(), LayerError>;

    /// Buffer a geometry replacement; visible only after [`commit`](Self::commit).
    fn change_geometry(&mut self, id: FeatureId, geometry: Geometry) -> Result<(), LayerError>;

    fn commit(&mut self) -> Result<(), LayerError>;

    /// Discard buffered edits.
    fn rollback(&mut self);
}

#[derive(Debug, Clone)]
pub struct MemoryLayer {
    name: String,
    crs: CrsId,
    features: BTreeMap<FeatureId, Geometry>,
    pending: Option<BTreeMap<FeatureId, Geometry>>,
}

impl MemoryLayer {
    pub fn new(name: impl Into<String>, crs: CrsId) -> Self {
        Self {
            name: name.into(),
            crs,
            features: BTreeMap::new(),
            pending: None,
        }
    }

    pub fn with_features<I>(name: impl Into<String>, crs: CrsId, features: I) -> Self
    where
        I: IntoIterator<Item = (FeatureId, Geometry)>,
    {
        let mut layer = Self::new(name, crs);
        layer.features.extend(features);
        layer
    }

    pub fn insert(&mut self, id: FeatureId, geometry: Geometry) {
        self.features.insert(id, geometry);
    }

    pub fn features(&self) -> &BTreeMap<FeatureId, Geometry> {
        &self.features
    }

    pub fn into_features(self) -> BTreeMap<FeatureId, Geometry> {
        self.features
    }

    pub fn is_editing(&self) -> bool {
        self.pending.is_some()
    }
}

impl EditableLayer for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn crs(&self) -> &CrsId {
        &self.crs
    }

    fn features_in(&self, rect: &BBox) -> BTreeMap<FeatureId, Geometry> {
        self.features
            .iter()
            .filter(|(_, g)| g.bbox().is_some_and(|b| b.intersects(rect)))
            .map(|(id, g)| (*id, g.clone()))
            .collect()
    }

    fn begin_edit(&mut self) -> Result<(), LayerError> {
        if self.pending.is_some() {
            return Err(LayerError::AlreadyEditing);
        }
        self.pending = Some(BTreeMap::new());
        Ok(())
    }

    fn change_geometry(&mut self, id: FeatureId, geometry: Geometry) -> Result<(), LayerError> {
        if !self.features.contains_key(&id) {
            return Err(LayerError::UnknownFeature(id));
        }
        let pending = self.pending.as_mut().ok_or(LayerError::NotEditing)?;
        pending.insert(id, geometry);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), LayerError> {
        let pending = self.pending.take().ok_or(LayerError::NotEditing)?;
        tracing::debug!(layer = %self.name, changed = pending.len(), "commit");
        self.features.extend(pending);
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending = None;
    }
}
