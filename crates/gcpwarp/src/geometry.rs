//! Planar geometry primitives: rectangles and vertex-addressable geometries.
//!
//! [`Geometry`] serializes as a GeoJSON geometry object
//! (`{"type": "LineString", "coordinates": [...]}`).

/// Axis-aligned rectangle. Containment is boundary-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl BBox {
    /// Covers the whole plane.
    pub const UNBOUNDED: BBox = BBox {
        min: [f64::NEG_INFINITY, f64::NEG_INFINITY],
        max: [f64::INFINITY, f64::INFINITY],
    };

    /// Build a rectangle from two opposite corners in any order.
    pub fn new(a: [f64; 2], b: [f64; 2]) -> Self {
        Self {
            min: [a[0].min(b[0]), a[1].min(b[1])],
            max: [a[0].max(b[0]), a[1].max(b[1])],
        }
    }

    /// Smallest rectangle enclosing all finite points, or `None` if there are none.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut it = points
            .into_iter()
            .filter(|p| p[0].is_finite() && p[1].is_finite());
        let first = it.next()?;
        let mut bbox = Self {
            min: first,
            max: first,
        };
        for p in it {
            bbox.min[0] = bbox.min[0].min(p[0]);
            bbox.min[1] = bbox.min[1].min(p[1]);
            bbox.max[0] = bbox.max[0].max(p[0]);
            bbox.max[1] = bbox.max[1].max(p[1]);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }

    /// Inclusive point test; points on any edge are inside.
    pub fn contains(&self, p: [f64; 2]) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }

    /// Inclusive overlap test.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min[0] <= other.max[0]
            && other.min[0] <= self.max[0]
            && self.min[1] <= other.max[1]
            && other.min[1] <= self.max[1]
    }
}

/// Vector geometry with XY vertices.
///
/// Vertices are numbered in storage order: parts first to last, rings
/// exterior first, each ring including its closing vertex.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    MultiPoint(Vec<[f64; 2]>),
    LineString(Vec<[f64; 2]>),
    MultiLineString(Vec<Vec<[f64; 2]>>),
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

impl Geometry {
    /// Contiguous vertex runs in storage order.
    fn vertex_runs(&self) -> Vec<&[[f64; 2]]> {
        match self {
            Self::Point(p) => vec![std::slice::from_ref(p)],
            Self::MultiPoint(pts) | Self::LineString(pts) => vec![pts.as_slice()],
            Self::MultiLineString(parts) | Self::Polygon(parts) => {
                parts.iter().map(Vec::as_slice).collect()
            }
            Self::MultiPolygon(polys) => polys
                .iter()
                .flat_map(|rings| rings.iter().map(Vec::as_slice))
                .collect(),
        }
    }

    fn vertex_runs_mut(&mut self) -> Vec<&mut [[f64; 2]]> {
        match self {
            Self::Point(p) => vec![std::slice::from_mut(p)],
            Self::MultiPoint(pts) | Self::LineString(pts) => vec![pts.as_mut_slice()],
            Self::MultiLineString(parts) | Self::Polygon(parts) => {
                parts.iter_mut().map(Vec::as_mut_slice).collect()
            }
            Self::MultiPolygon(polys) => polys
                .iter_mut()
                .flat_map(|rings| rings.iter_mut().map(Vec::as_mut_slice))
                .collect(),
        }
    }

    /// All vertices in storage order.
    pub fn vertices(&self) -> impl Iterator<Item = &[f64; 2]> + '_ {
        self.vertex_runs().into_iter().flatten()
    }

    pub fn vertices_mut(&mut self) -> impl Iterator<Item = &mut [f64; 2]> + '_ {
        self.vertex_runs_mut().into_iter().flatten()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_runs().iter().map(|run| run.len()).sum()
    }

    /// Replace vertex `n`. Returns `false` when `n` is out of range.
    pub fn move_vertex(&mut self, n: usize, xy: [f64; 2]) -> bool {
        match self.vertices_mut().nth(n) {
            Some(v) => {
                *v = xy;
                true
            }
            None => false,
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(self.vertices().copied())
    }

    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::MultiPoint(_) => "MultiPoint",
            Self::LineString(_) => "LineString",
            Self::MultiLineString(_) => "MultiLineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }
}
