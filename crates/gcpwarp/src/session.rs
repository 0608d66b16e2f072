//! Correction session: correspondences, active method, AOI and fit cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::corrector::{correct_features, AreaOfInterest, CorrectionBatch};
use crate::crs::{reproject_bbox, CrsId, Reprojector, BBOX_DENSIFY_SEGMENTS};
use crate::geometry::{BBox, Geometry};
use crate::layer::{EditableLayer, FeatureId, LayerError};
use crate::residuals::{update_residuals, ResidualReport};
use crate::store::{CorrespondenceStore, StoreEvent, SubscriptionId};
use crate::transform::{FitError, FittedTransform, TransformCache, TransformMethod};

/// Why `apply_correction` did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyError {
    NoAreaOfInterest,
    Fit(FitError),
    Layer { layer: String, source: LayerError },
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAreaOfInterest => write!(f, "no area of interest set"),
            Self::Fit(e) => write!(f, "{e}"),
            Self::Layer { layer, source } => write!(f, "layer '{layer}': {source}"),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoAreaOfInterest => None,
            Self::Fit(e) => Some(e),
            Self::Layer { source, .. } => Some(source),
        }
    }
}

impl From<FitError> for ApplyError {
    fn from(e: FitError) -> Self {
        Self::Fit(e)
    }
}

/// Outcome for one layer of an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerReport {
    pub layer: String,
    /// Features passed through the corrector.
    pub examined: usize,
    /// Features whose geometry changed and was committed.
    pub corrected: usize,
    pub failed: Vec<FeatureId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub layers: Vec<LayerReport>,
}

impl ApplyReport {
    pub fn failed_count(&self) -> usize {
        self.layers.iter().map(|l| l.failed.len()).sum()
    }

    pub fn corrected_count(&self) -> usize {
        self.layers.iter().map(|l| l.corrected).sum()
    }
}

/// Owns the correspondences and everything derived from them.
///
/// Every mutation made through the session invalidates the cached fit and
/// recomputes residuals with the active method.
pub struct CorrectionSession {
    store: CorrespondenceStore,
    cache: TransformCache,
    reprojector: Box<dyn Reprojector>,
    method: TransformMethod,
    aoi: Option<AreaOfInterest>,
    reference_crs: Option<CrsId>,
    last_residuals: Result<ResidualReport, FitError>,
}

impl std::fmt::Debug for CorrectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionSession")
            .field("store", &self.store)
            .field("method", &self.method)
            .field("aoi", &self.aoi)
            .finish_non_exhaustive()
    }
}

impl CorrectionSession {
    pub fn new(reprojector: impl Reprojector + 'static) -> Self {
        Self {
            store: CorrespondenceStore::new(),
            cache: TransformCache::new(),
            reprojector: Box::new(reprojector),
            method: TransformMethod::default(),
            aoi: None,
            reference_crs: None,
            last_residuals: Ok(ResidualReport::default()),
        }
    }

    pub fn with_method(mut self, method: TransformMethod) -> Self {
        self.method = method;
        self
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    pub fn reprojector(&self) -> &dyn Reprojector {
        self.reprojector.as_ref()
    }

    pub fn cache(&self) -> &TransformCache {
        &self.cache
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        self.store.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn method(&self) -> TransformMethod {
        self.method
    }

    pub fn set_method(&mut self, method: TransformMethod) {
        if method == self.method {
            return;
        }
        tracing::info!(%method, "transform method changed");
        self.method = method;
        self.refresh_residuals();
    }

    /// CRS residuals are measured in; `None` uses the first point's CRS.
    pub fn set_reference_crs(&mut self, crs: Option<CrsId>) {
        self.reference_crs = crs;
        self.refresh_residuals();
    }

    pub fn area_of_interest(&self) -> Option<&AreaOfInterest> {
        self.aoi.as_ref()
    }

    pub fn set_area_of_interest(&mut self, aoi: Option<AreaOfInterest>) {
        self.aoi = aoi;
    }

    /// Outcome of the most recent residual recomputation.
    pub fn last_residual_status(&self) -> &Result<ResidualReport, FitError> {
        &self.last_residuals
    }

    pub fn add_gcp(&mut self, origin: [f64; 2], destination: [f64; 2], crs: CrsId) -> usize {
        let index = self.store.add(origin, destination, crs);
        self.after_mutation();
        index
    }

    /// Remove rows and return the indices actually removed, highest first.
    pub fn remove_gcps<I>(&mut self, indices: I) -> Vec<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        let removed = self.store.remove(indices);
        if !removed.is_empty() {
            self.after_mutation();
        }
        removed
    }

    pub fn clear(&mut self) {
        if self.store.is_empty() {
            return;
        }
        self.store.clear();
        self.after_mutation();
    }

    /// Replace every correspondence at once; used by file loading.
    pub(crate) fn replace_all<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = ([f64; 2], [f64; 2], CrsId)>,
    {
        self.store.clear();
        for (origin, destination, crs) in points {
            self.store.add(origin, destination, crs);
        }
        self.after_mutation();
    }

    fn after_mutation(&mut self) {
        self.cache.invalidate();
        self.refresh_residuals();
    }

    fn refresh_residuals(&mut self) {
        let Self {
            store,
            cache,
            reprojector,
            method,
            reference_crs,
            last_residuals,
            ..
        } = self;
        let reprojector: &dyn Reprojector = &**reprojector;
        let method = *method;
        let reference_crs = reference_crs.as_ref();
        *last_residuals = update_residuals(store, reference_crs, reprojector, |points, crs| {
            cache.get_or_fit(method, points, crs, reprojector)
        });
    }

    /// Cache-backed fit of the current correspondences in `target_crs`.
    pub fn fitted_transform(&mut self, target_crs: &CrsId) -> Result<Arc<FittedTransform>, FitError> {
        self.cache.get_or_fit(
            self.method,
            self.store.points(),
            target_crs,
            self.reprojector.as_ref(),
        )
    }

    /// Correct `features` (in `feature_crs`) inside `aoi`.
    pub fn transform_features<Id>(
        &mut self,
        features: &BTreeMap<Id, Geometry>,
        feature_crs: &CrsId,
        aoi: &AreaOfInterest,
    ) -> Result<CorrectionBatch<Id>, FitError>
    where
        Id: Ord + Clone + std::fmt::Debug,
    {
        let transform = self.fitted_transform(feature_crs)?;
        Ok(correct_features(
            features,
            &transform,
            feature_crs,
            aoi,
            self.reprojector.as_ref(),
        ))
    }

    /// Correct every feature of each layer that falls within the session AOI.
    ///
    /// The transform and the AOI filter rectangle are prepared for every layer
    /// before any layer enters edit mode, so a fit failure leaves all layers
    /// untouched. When the AOI outline cannot be reprojected into a layer's
    /// CRS the whole layer is scanned and the per-vertex AOI test decides.
    /// Geometries that fail to transform are skipped and reported; the rest
    /// are committed in one edit per layer.
    pub fn apply_correction(
        &mut self,
        layers: &mut [&mut dyn EditableLayer],
    ) -> Result<ApplyReport, ApplyError> {
        let aoi = self.aoi.clone().ok_or(ApplyError::NoAreaOfInterest)?;

        let mut prepared = Vec::with_capacity(layers.len());
        for layer in layers.iter() {
            let transform = self.fitted_transform(layer.crs())?;
            let filter = match reproject_bbox(
                self.reprojector.as_ref(),
                &aoi.rect,
                &aoi.crs,
                layer.crs(),
                BBOX_DENSIFY_SEGMENTS,
            ) {
                Ok(rect) => rect,
                Err(e) => {
                    tracing::debug!(layer = layer.name(), "scanning whole layer: {e}");
                    BBox::UNBOUNDED
                }
            };
            prepared.push((transform, filter));
        }

        let mut report = ApplyReport::default();
        for (layer, (transform, filter)) in layers.iter_mut().zip(prepared) {
            let features = layer.features_in(&filter);
            let layer_crs = layer.crs().clone();
            let batch = correct_features(
                &features,
                &transform,
                &layer_crs,
                &aoi,
                self.reprojector.as_ref(),
            );
            let layer_report = commit_batch(&mut **layer, &features, &batch).map_err(|source| {
                ApplyError::Layer {
                    layer: layer.name().to_string(),
                    source,
                }
            })?;
            tracing::info!(
                layer = %layer_report.layer,
                corrected = layer_report.corrected,
                failed = layer_report.failed.len(),
                "correction applied"
            );
            report.layers.push(layer_report);
        }
        Ok(report)
    }
}

fn commit_batch(
    layer: &mut dyn EditableLayer,
    original: &BTreeMap<FeatureId, Geometry>,
    batch: &CorrectionBatch<FeatureId>,
) -> Result<LayerReport, LayerError> {
    layer.begin_edit()?;
    let mut corrected = 0;
    for (id, geometry) in batch.succeeded() {
        if original.get(id) == Some(geometry) {
            continue;
        }
        if let Err(e) = layer.change_geometry(*id, geometry.clone()) {
            layer.rollback();
            return Err(e);
        }
        corrected += 1;
    }
    if let Err(e) = layer.commit() {
        layer.rollback();
        return Err(e);
    }
    Ok(LayerReport {
        layer: layer.name().to_string(),
        examined: batch.len(),
        corrected,
        failed: batch.failures().map(|(id, _)| *id).collect(),
    })
}
