//! Single-entry memo of the most recent fit.

use std::sync::Arc;

use super::{fit, FitError, FittedTransform, TransformMethod};
use crate::crs::{CrsId, Reprojector};
use crate::store::{snapshot_hash, CorrespondencePoint};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    method: TransformMethod,
    target_crs: CrsId,
    snapshot: u64,
}

/// Keeps the last [`FittedTransform`] keyed by method, working CRS and the
/// correspondence snapshot it was solved from.
///
/// Failed fits are not cached.
#[derive(Debug, Default)]
pub struct TransformCache {
    entry: Option<(CacheKey, Arc<FittedTransform>)>,
    hits: u64,
    misses: u64,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached transform for this request or fit a new one.
    pub fn get_or_fit(
        &mut self,
        method: TransformMethod,
        points: &[CorrespondencePoint],
        target_crs: &CrsId,
        reprojector: &dyn Reprojector,
    ) -> Result<Arc<FittedTransform>, FitError> {
        let key = CacheKey {
            method,
            target_crs: target_crs.clone(),
            snapshot: snapshot_hash(points),
        };
        if let Some((cached_key, transform)) = &self.entry {
            if *cached_key == key {
                self.hits += 1;
                tracing::debug!(%method, crs = %target_crs, "transform cache hit");
                return Ok(Arc::clone(transform));
            }
        }

        self.misses += 1;
        let transform = Arc::new(fit(method, points, target_crs, reprojector)?);
        self.entry = Some((key, Arc::clone(&transform)));
        Ok(transform)
    }

    /// Forget the cached transform.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::IdentityReprojector;
    use crate::test_utils::{gcps, wgs84, SHIFT_10};

    #[test]
    fn identical_requests_reuse_the_fit() {
        let pts = gcps(&SHIFT_10);
        let mut cache = TransformCache::new();
        let a = cache
            .get_or_fit(TransformMethod::Helmert, &pts, &wgs84(), &IdentityReprojector)
            .unwrap();
        let b = cache
            .get_or_fit(TransformMethod::Helmert, &pts, &wgs84(), &IdentityReprojector)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn key_changes_force_a_refit() {
        let mut pts = gcps(&SHIFT_10);
        let mut cache = TransformCache::new();
        let r = IdentityReprojector;
        let a = cache
            .get_or_fit(TransformMethod::Helmert, &pts, &wgs84(), &r)
            .unwrap();

        let b = cache
            .get_or_fit(TransformMethod::PolynomialOrder1, &pts, &wgs84(), &r)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        pts[0].destination = [11.0, 10.0];
        let c = cache
            .get_or_fit(TransformMethod::PolynomialOrder1, &pts, &wgs84(), &r)
            .unwrap();
        assert!(!Arc::ptr_eq(&b, &c));
        assert_eq!(cache.stats(), (0, 3));

        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let pts = gcps(&SHIFT_10[..1]);
        let mut cache = TransformCache::new();
        assert!(cache
            .get_or_fit(TransformMethod::Helmert, &pts, &wgs84(), &IdentityReprojector)
            .is_err());
        assert!(cache.is_empty());
    }
}
