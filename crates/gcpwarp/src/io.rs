//! Correspondence files and GeoJSON export.
//!
//! The correspondence text format is one point per line:
//!
//! ```text
//! originX,originY,destinationX,destinationY,crsAuthorityId
//! ```

use std::path::Path;

use crate::crs::{CrsId, ReprojectionError, Reprojector};
use crate::geometry::Geometry;
use crate::session::CorrectionSession;
use crate::store::{CorrespondencePoint, CorrespondenceStore};

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Counts from reading a correspondence file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    /// Non-blank lines that were not valid records.
    pub skipped: usize,
}

/// One parsed record: origin, destination, CRS.
pub type GcpRecord = ([f64; 2], [f64; 2], CrsId);

fn parse_line(line: &str) -> Option<GcpRecord> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [ox, oy, dx, dy, crs] = fields.as_slice() else {
        return None;
    };
    let num = |s: &str| s.parse::<f64>().ok();
    Some((
        [num(*ox)?, num(*oy)?],
        [num(*dx)?, num(*dy)?],
        CrsId::new(*crs),
    ))
}

/// Parse correspondence text. Malformed lines are skipped and counted.
pub fn parse_gcps(text: &str) -> (Vec<GcpRecord>, LoadReport) {
    let mut records = Vec::new();
    let mut report = LoadReport::default();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(record) => {
                records.push(record);
                report.loaded += 1;
            }
            None => {
                tracing::warn!(line = n + 1, "skipping malformed GCP record: {line:?}");
                report.skipped += 1;
            }
        }
    }
    (records, report)
}

/// Render points in file order, one line each.
pub fn format_gcps(points: &[CorrespondencePoint]) -> String {
    let mut out = String::new();
    for p in points {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            p.origin[0], p.origin[1], p.destination[0], p.destination[1], p.crs
        ));
    }
    out
}

/// Write every point of `store` to `path`, replacing any existing file.
pub fn save_gcps(path: &Path, store: &CorrespondenceStore) -> Result<(), PersistError> {
    std::fs::write(path, format_gcps(store.points()))?;
    tracing::info!(path = %path.display(), count = store.len(), "saved GCPs");
    Ok(())
}

fn read_gcp_file(path: &Path) -> Result<(Vec<GcpRecord>, LoadReport), PersistError> {
    let text = std::fs::read_to_string(path)?;
    let (records, report) = parse_gcps(&text);
    tracing::info!(
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped,
        "loaded GCPs"
    );
    Ok((records, report))
}

/// Replace the contents of `store` with the records in `path`.
pub fn load_gcps(path: &Path, store: &mut CorrespondenceStore) -> Result<LoadReport, PersistError> {
    let (records, report) = read_gcp_file(path)?;
    store.clear();
    for (origin, destination, crs) in records {
        store.add(origin, destination, crs);
    }
    Ok(report)
}

impl CorrectionSession {
    /// Replace the session's correspondences with the file contents and
    /// recompute residuals.
    pub fn load_gcps(&mut self, path: &Path) -> Result<LoadReport, PersistError> {
        let (records, report) = read_gcp_file(path)?;
        self.replace_all(records);
        Ok(report)
    }

    pub fn save_gcps(&self, path: &Path) -> Result<(), PersistError> {
        save_gcps(path, self.store())
    }
}

/// A correspondence drawn as a line from origin to destination.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionLine {
    /// 1-based row number.
    pub row: usize,
    pub source_x: f64,
    pub source_y: f64,
    pub dest_x: f64,
    pub dest_y: f64,
    pub residual: Option<f64>,
    /// Two-vertex line in the export CRS.
    pub geometry: Geometry,
}

/// One line per correspondence, with coordinates reprojected into `crs`.
///
/// Attribute coordinates are the stored values; only the geometry is
/// reprojected.
pub fn correction_lines(
    points: &[CorrespondencePoint],
    crs: &CrsId,
    reprojector: &dyn Reprojector,
) -> Result<Vec<CorrectionLine>, ReprojectionError> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let from = reprojector.reproject(&p.crs, crs, p.origin)?;
            let to = reprojector.reproject(&p.crs, crs, p.destination)?;
            Ok(CorrectionLine {
                row: i + 1,
                source_x: p.origin[0],
                source_y: p.origin[1],
                dest_x: p.destination[0],
                dest_y: p.destination[1],
                residual: p.residual(),
                geometry: Geometry::LineString(vec![from, to]),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
enum FeatureTag {
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
enum CollectionTag {
    FeatureCollection,
}

/// GeoJSON feature.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    tag: FeatureTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

fn null_as_empty<'de, D>(d: D) -> Result<serde_json::Map<String, serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Ok(Option::deserialize(d)?.unwrap_or_default())
}

impl Feature {
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self {
            tag: FeatureTag::Feature,
            id: None,
            geometry,
            properties: serde_json::Map::new(),
        }
    }
}

/// GeoJSON feature collection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    tag: CollectionTag,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            tag: CollectionTag::FeatureCollection,
            features,
        }
    }
}

impl From<&CorrectionLine> for Feature {
    fn from(line: &CorrectionLine) -> Self {
        let mut feature = Feature::new(Some(line.geometry.clone()));
        let props = &mut feature.properties;
        props.insert("row".into(), line.row.into());
        props.insert("source_x".into(), line.source_x.into());
        props.insert("source_y".into(), line.source_y.into());
        props.insert("dest_x".into(), line.dest_x.into());
        props.insert("dest_y".into(), line.dest_y.into());
        props.insert("residual".into(), line.residual.into());
        feature
    }
}

pub fn read_geojson(path: &Path) -> Result<FeatureCollection, PersistError> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub fn write_geojson(path: &Path, collection: &FeatureCollection) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(collection)?;
    std::fs::write(path, json)?;
    tracing::info!(
        path = %path.display(),
        features = collection.features.len(),
        "wrote GeoJSON"
    );
    Ok(())
}

/// Write the correspondence lines as a GeoJSON layer.
pub fn export_corrections(path: &Path, lines: &[CorrectionLine]) -> Result<(), PersistError> {
    let collection = FeatureCollection::new(lines.iter().map(Feature::from).collect());
    write_geojson(path, &collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{IdentityReprojector, WebMercatorReprojector, EPSG_WEB_MERCATOR};
    use crate::test_utils::{store_with, wgs84, SHIFT_10};

    #[test]
    fn save_then_load_reproduces_triples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcps.txt");

        let mut store = store_with(&[([0.1, 0.2], [1.0 / 3.0, -7.25])]);
        store.add([100.0, 101.0], [200.0, 202.0], CrsId::new("EPSG:3111"));
        save_gcps(&path, &store).unwrap();

        let mut loaded = CorrespondenceStore::new();
        loaded.add([9.0, 9.0], [9.0, 9.0], wgs84());
        let report = load_gcps(&path, &mut loaded).unwrap();

        assert_eq!(report, LoadReport { loaded: 2, skipped: 0 });
        assert_eq!(loaded.points(), store.points());
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcps.txt");
        std::fs::write(&path, "junk\njunk\njunk\n").unwrap();

        save_gcps(&path, &store_with(&SHIFT_10[..1])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0,0,10,10,EPSG:4326\n");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "1,2,3,4,EPSG:4326\n\
                    1,2,3,EPSG:4326\n\
                    \n\
                    a,2,3,4,EPSG:4326\n\
                    1,2,3,4,EPSG:4326,extra\n\
                    5, 6, 7, 8, EPSG:3857\n";
        let (records, report) = parse_gcps(text);
        assert_eq!(report, LoadReport { loaded: 2, skipped: 3 });
        assert_eq!(records[1], ([5.0, 6.0], [7.0, 8.0], CrsId::new("EPSG:3857")));
    }

    #[test]
    fn session_load_recomputes_residuals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcps.txt");
        std::fs::write(&path, format_gcps(store_with(&SHIFT_10).points())).unwrap();

        let mut session = CorrectionSession::new(IdentityReprojector);
        let report = session.load_gcps(&path).unwrap();
        assert_eq!(report.loaded, 3);
        assert!(session.last_residual_status().is_ok());
        assert!(session.store().points().iter().all(|p| p.residual().is_some()));
    }

    #[test]
    fn session_and_store_loads_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcps.txt");
        std::fs::write(&path, "0,0,10,10,EPSG:4326\nbad line\n100,0,110,10,EPSG:4326\n").unwrap();

        let mut store = CorrespondenceStore::new();
        let store_report = load_gcps(&path, &mut store).unwrap();
        let mut session = CorrectionSession::new(IdentityReprojector);
        let session_report = session.load_gcps(&path).unwrap();

        assert_eq!(store_report, session_report);
        assert_eq!(session_report, LoadReport { loaded: 2, skipped: 1 });
        let origins: Vec<_> = session.store().points().iter().map(|p| p.origin).collect();
        assert_eq!(origins, store.points().iter().map(|p| p.origin).collect::<Vec<_>>());

        let missing = dir.path().join("missing.txt");
        assert!(matches!(session.load_gcps(&missing), Err(PersistError::Io(_))));
        assert_eq!(session.store().len(), 2);
    }

    #[test]
    fn correction_lines_reproject_geometry_only() {
        let store = store_with(&[([10.0, 45.0], [10.5, 45.5])]);
        let merc = CrsId::new(EPSG_WEB_MERCATOR);
        let lines = correction_lines(store.points(), &merc, &WebMercatorReprojector).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].row, 1);
        assert_eq!((lines[0].source_x, lines[0].dest_y), (10.0, 45.5));
        assert_eq!(lines[0].residual, None);
        let Geometry::LineString(v) = &lines[0].geometry else {
            panic!("line expected");
        };
        assert_eq!(v.len(), 2);
        assert!(v[0][0] > 1.0e6);
    }

    #[test]
    fn exported_geojson_has_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.geojson");
        let store = store_with(&SHIFT_10);
        let lines = correction_lines(store.points(), &wgs84(), &IdentityReprojector).unwrap();
        export_corrections(&path, &lines).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let f = &value["features"][2];
        assert_eq!(f["type"], "Feature");
        assert_eq!(f["geometry"]["type"], "LineString");
        assert_eq!(f["properties"]["row"], 3);
        assert_eq!(f["properties"]["dest_y"], 110.0);
        assert!(f["properties"]["residual"].is_null());

        let back = read_geojson(&path).unwrap();
        assert_eq!(back.features.len(), 3);
    }

    #[test]
    fn reads_features_with_null_properties() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":4,"geometry":{"type":"Point","coordinates":[1.5,2.5]},"properties":null},
            {"type":"Feature","geometry":null}
        ]}"#;
        let fc: FeatureCollection = serde_json::from_str(json).unwrap();
        assert_eq!(fc.features[0].id, Some(serde_json::json!(4)));
        assert_eq!(fc.features[0].geometry, Some(Geometry::Point([1.5, 2.5])));
        assert!(fc.features[0].properties.is_empty());
        assert_eq!(fc.features[1].geometry, None);
    }
}
