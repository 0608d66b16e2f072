//! Correct an in-memory layer with a handful of GCPs.
//!
//! Run with `RUST_LOG=debug` to see fit and cache details.

use gcpwarp::{
    AreaOfInterest, BBox, CorrectionSession, CrsId, EditableLayer, Geometry, MemoryLayer,
    TransformMethod, WebMercatorReprojector, EPSG_WEB_MERCATOR, EPSG_WGS84,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let wgs84 = CrsId::new(EPSG_WGS84);
    let mut session = CorrectionSession::new(WebMercatorReprojector)
        .with_method(TransformMethod::PolynomialOrder1);

    session.add_gcp([144.95, -37.82], [144.9502, -37.8201], wgs84.clone());
    session.add_gcp([144.98, -37.82], [144.9801, -37.8202], wgs84.clone());
    session.add_gcp([144.96, -37.80], [144.9603, -37.8000], wgs84.clone());
    session.add_gcp([144.97, -37.79], [144.9702, -37.7901], wgs84.clone());

    for (i, p) in session.store().points().iter().enumerate() {
        println!("row {}: residual {:?}", i + 1, p.residual());
    }

    let mut layer = MemoryLayer::with_features(
        "streets",
        wgs84.clone(),
        [
            (1, Geometry::LineString(vec![[144.955, -37.815], [144.975, -37.805]])),
            (2, Geometry::Point([145.2, -37.5])),
        ],
    );

    let merc = CrsId::new(EPSG_WEB_MERCATOR);
    let lo = gcpwarp::Reprojector::reproject(&WebMercatorReprojector, &wgs84, &merc, [144.94, -37.83])?;
    let hi = gcpwarp::Reprojector::reproject(&WebMercatorReprojector, &wgs84, &merc, [144.99, -37.78])?;
    session.set_area_of_interest(Some(AreaOfInterest::new(BBox::new(lo, hi), merc)));

    let report = session.apply_correction(&mut [&mut layer])?;
    println!(
        "{}: {} corrected, {} failed",
        layer.name(),
        report.corrected_count(),
        report.failed_count()
    );
    for (id, g) in layer.features() {
        println!("  {id}: {}", serde_json::to_string(g)?);
    }
    Ok(())
}
