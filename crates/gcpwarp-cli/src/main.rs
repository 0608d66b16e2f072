//! gcpwarp CLI — fit GCP transforms and correct GeoJSON features from the shell.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use gcpwarp::io::{correction_lines, export_corrections, read_geojson, write_geojson};
use gcpwarp::settings::Settings;
use gcpwarp::{
    AreaOfInterest, BBox, CorrectionSession, CrsId, MemoryLayer, TransformMethod,
    WebMercatorReprojector, EPSG_WGS84,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "gcpwarp")]
#[command(about = "Correct vector geometries using ground control points")]
#[command(version)]
struct Cli {
    /// Settings file (JSON) supplying the default transform method.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the GCPs and print per-row residuals.
    Residuals(CliResidualsArgs),

    /// Export GCPs as a GeoJSON line layer.
    Export(CliExportArgs),

    /// Correct features inside an area of interest.
    Correct(CliCorrectArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Linear,
    Helmert,
    Poly1,
    Poly2,
    Poly3,
    Tps,
    Projective,
}

impl From<MethodArg> for TransformMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Linear => TransformMethod::Linear,
            MethodArg::Helmert => TransformMethod::Helmert,
            MethodArg::Poly1 => TransformMethod::PolynomialOrder1,
            MethodArg::Poly2 => TransformMethod::PolynomialOrder2,
            MethodArg::Poly3 => TransformMethod::PolynomialOrder3,
            MethodArg::Tps => TransformMethod::ThinPlateSpline,
            MethodArg::Projective => TransformMethod::Projective,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliResidualsArgs {
    /// GCP file (`ox,oy,dx,dy,crs` per line).
    #[arg(long)]
    gcps: PathBuf,

    /// Transform method (overrides the settings file).
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Working CRS for residuals (default: CRS of the first GCP).
    #[arg(long)]
    crs: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct CliExportArgs {
    /// GCP file (`ox,oy,dx,dy,crs` per line).
    #[arg(long)]
    gcps: PathBuf,

    /// Output GeoJSON path.
    #[arg(long)]
    out: PathBuf,

    /// CRS of the exported line geometries.
    #[arg(long, default_value = EPSG_WGS84)]
    crs: String,

    /// Transform method used for the residual attribute.
    #[arg(long, value_enum)]
    method: Option<MethodArg>,
}

#[derive(Debug, Clone, Args)]
struct CliCorrectArgs {
    /// GCP file (`ox,oy,dx,dy,crs` per line).
    #[arg(long)]
    gcps: PathBuf,

    /// Input GeoJSON feature collection.
    #[arg(long)]
    features: PathBuf,

    /// Output GeoJSON path.
    #[arg(long)]
    out: PathBuf,

    /// Area of interest as `minx,miny,maxx,maxy`.
    #[arg(long, value_parser = parse_bbox)]
    aoi: BBox,

    /// CRS of the AOI rectangle (default: the features CRS).
    #[arg(long)]
    aoi_crs: Option<String>,

    /// CRS of the input features.
    #[arg(long, default_value = EPSG_WGS84)]
    features_crs: String,

    #[arg(long, value_enum)]
    method: Option<MethodArg>,
}

fn parse_bbox(s: &str) -> Result<BBox, String> {
    let v: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in '{s}': {e}"))?;
    match v.as_slice() {
        [x0, y0, x1, y1] => Ok(BBox::new([*x0, *y0], [*x1, *y1])),
        _ => Err(format!("expected minx,miny,maxx,maxy, got '{s}'")),
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Residuals(args) => run_residuals(&args, &settings),
        Commands::Export(args) => run_export(&args, &settings),
        Commands::Correct(args) => run_correct(&args, &settings),
    }
}

fn resolve_method(arg: Option<MethodArg>, settings: &Settings) -> TransformMethod {
    arg.map(Into::into).unwrap_or(settings.transform_method)
}

fn open_session(
    gcps: &Path,
    method: TransformMethod,
    reference_crs: Option<CrsId>,
) -> CliResult<CorrectionSession> {
    let mut session = CorrectionSession::new(WebMercatorReprojector).with_method(method);
    session.set_reference_crs(reference_crs);
    let report = session.load_gcps(gcps)?;
    if report.loaded == 0 {
        return Err(format!("no GCPs found in {}", gcps.display()).into());
    }
    tracing::info!("{} GCPs loaded, method {}", report.loaded, method);
    Ok(session)
}

// ── residuals ──────────────────────────────────────────────────────────

fn run_residuals(args: &CliResidualsArgs, settings: &Settings) -> CliResult<()> {
    let method = resolve_method(args.method, settings);
    let reference_crs = args.crs.as_deref().map(CrsId::new);
    let mut session = open_session(&args.gcps, method, reference_crs.clone())?;

    let report = match session.last_residual_status() {
        Ok(report) => report.clone(),
        Err(e) => return Err(e.clone().into()),
    };
    let crs = match reference_crs {
        Some(crs) => crs,
        None => session.store().points()[0].crs.clone(),
    };
    let transform = session.fitted_transform(&crs)?;
    tracing::info!("{transform}");
    for (i, failure) in &report.failed {
        tracing::warn!("row {}: {failure}", i + 1);
    }

    println!(
        "{:>4}  {:>14} {:>14}  {:>14} {:>14}  {:>12}",
        "row", "src_x", "src_y", "dst_x", "dst_y", "residual"
    );
    for (i, p) in session.store().points().iter().enumerate() {
        let residual = p
            .residual()
            .map_or_else(|| "-".to_string(), |r| format!("{r:.6}"));
        println!(
            "{:>4}  {:>14.6} {:>14.6}  {:>14.6} {:>14.6}  {:>12}",
            i + 1,
            p.origin[0],
            p.origin[1],
            p.destination[0],
            p.destination[1],
            residual
        );
    }
    Ok(())
}

// ── export ─────────────────────────────────────────────────────────────

fn run_export(args: &CliExportArgs, settings: &Settings) -> CliResult<()> {
    let method = resolve_method(args.method, settings);
    let session = open_session(&args.gcps, method, None)?;
    if let Err(e) = session.last_residual_status() {
        tracing::warn!("exporting without residuals: {e}");
    }

    let crs = CrsId::new(args.crs.as_str());
    let lines = correction_lines(session.store().points(), &crs, session.reprojector())?;
    export_corrections(&args.out, &lines)?;
    tracing::info!("{} correction lines written to {}", lines.len(), args.out.display());
    Ok(())
}

// ── correct ────────────────────────────────────────────────────────────

fn run_correct(args: &CliCorrectArgs, settings: &Settings) -> CliResult<()> {
    let method = resolve_method(args.method, settings);
    let mut session = open_session(&args.gcps, method, None)?;

    let features_crs = CrsId::new(args.features_crs.as_str());
    let aoi_crs = args
        .aoi_crs
        .as_deref()
        .map_or_else(|| features_crs.clone(), CrsId::new);
    session.set_area_of_interest(Some(AreaOfInterest::new(args.aoi, aoi_crs)));

    let mut collection = read_geojson(&args.features)?;
    let mut layer = MemoryLayer::new(args.features.display().to_string(), features_crs);
    for (i, feature) in collection.features.iter().enumerate() {
        if let Some(g) = &feature.geometry {
            layer.insert(i as u64, g.clone());
        }
    }

    let report = session.apply_correction(&mut [&mut layer])?;
    for (i, geometry) in layer.into_features() {
        collection.features[i as usize].geometry = Some(geometry);
    }
    write_geojson(&args.out, &collection)?;

    tracing::info!(
        "{} of {} features corrected, {} failed",
        report.corrected_count(),
        collection.features.len(),
        report.failed_count()
    );
    for layer_report in &report.layers {
        if !layer_report.failed.is_empty() {
            tracing::warn!("features left unchanged: {:?}", layer_report.failed);
        }
    }
    Ok(())
}
