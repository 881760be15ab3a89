//! Geographic coordinates and the local metric frame
//!
//! Every geometric operation in the pipeline (ellipse fitting, rotation,
//! polygon membership, grid layout) happens in a kilometer-scaled tangent
//! plane. Degrees only appear at the I/O boundary: `LocalFrame::to_metric`
//! on the way in and `LocalFrame::to_geographic` on the way out.
//!
//! The projection is the spherical azimuthal equidistant projection centred
//! on the frame origin. Distances and bearings from the origin are exact, and
//! for the few-hundred-kilometer extents of a drop zone the scale distortion
//! elsewhere stays well below the cell size.
//!
//! # References
//!
//! - Snyder, J.P. (1987). Map Projections: A Working Manual. USGS Professional
//!   Paper 1395, pp. 191-202.

use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG), km
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Geographic position in decimal degrees (WGS84 latitude/longitude on a sphere)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north
    pub lat: f64,
    /// Longitude in degrees, positive east, normalised to [-180, 180)
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new geographic point, normalising longitude
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon: normalize_longitude(lon),
        }
    }

    /// Whether both coordinates are finite and latitude lies in [-90, 90]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() <= 90.0
    }

    /// Great-circle distance to another point (haversine), km
    #[must_use]
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        EARTH_RADIUS_KM * central_angle(self, other)
    }

    /// Spherical centroid of a set of points.
    ///
    /// Averages the unit vectors rather than the raw degrees so clouds that
    /// straddle the antimeridian still get a sensible centre.
    ///
    /// # Returns
    ///
    /// `None` for an empty input or when the vectors cancel out
    pub fn centroid<'a, I>(points: I) -> Option<GeoPoint>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let (mut sx, mut sy, mut sz, mut n) = (0.0, 0.0, 0.0, 0usize);
        for p in points {
            let (lat, lon) = (p.lat.to_radians(), p.lon.to_radians());
            sx += lat.cos() * lon.cos();
            sy += lat.cos() * lon.sin();
            sz += lat.sin();
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let norm = (sx * sx + sy * sy + sz * sz).sqrt();
        if norm < 1e-12 {
            return None;
        }
        let lat = (sz / norm).asin().to_degrees();
        let lon = sy.atan2(sx).to_degrees();
        Some(GeoPoint::new(lat, lon))
    }
}

/// Point in a local metric frame, kilometers east (`x`) and north (`y`) of the origin
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Easting, km
    pub x: f64,
    /// Northing, km
    pub y: f64,
}

impl MetricPoint {
    /// Create a new metric point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point, km
    #[must_use]
    pub fn distance(&self, other: &MetricPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Azimuthal equidistant tangent plane anchored at `origin`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    origin: GeoPoint,
}

impl LocalFrame {
    /// Create a frame centred on `origin`
    #[must_use]
    pub fn new(origin: GeoPoint) -> Self {
        Self { origin }
    }

    /// Frame origin in geographic coordinates
    #[must_use]
    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// Project a geographic point into the frame (km east/north)
    #[must_use]
    pub fn to_metric(&self, point: &GeoPoint) -> MetricPoint {
        let phi0 = self.origin.lat.to_radians();
        let phi = point.lat.to_radians();
        let dlambda = (point.lon - self.origin.lon).to_radians();

        let c = central_angle(&self.origin, point);
        // k = c / sin(c) tends to 1 at the origin
        let k = if c.abs() < 1e-12 { 1.0 } else { c / c.sin() };

        let x = EARTH_RADIUS_KM * k * phi.cos() * dlambda.sin();
        let y = EARTH_RADIUS_KM
            * k
            * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * dlambda.cos());
        MetricPoint::new(x, y)
    }

    /// Inverse projection back to geographic coordinates
    #[must_use]
    pub fn to_geographic(&self, point: &MetricPoint) -> GeoPoint {
        let rho = point.x.hypot(point.y);
        if rho < 1e-12 {
            return self.origin;
        }
        let phi0 = self.origin.lat.to_radians();
        let c = rho / EARTH_RADIUS_KM;
        let (sin_c, cos_c) = c.sin_cos();

        let lat = (cos_c * phi0.sin() + point.y * sin_c * phi0.cos() / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let dlon = (point.x * sin_c).atan2(rho * phi0.cos() * cos_c - point.y * phi0.sin() * sin_c);

        GeoPoint::new(lat.to_degrees(), self.origin.lon + dlon.to_degrees())
    }

    /// Move from the origin along a bearing (degrees clockwise from north)
    #[must_use]
    pub fn destination(&self, bearing_deg: f64, distance_km: f64) -> GeoPoint {
        let b = bearing_deg.to_radians();
        self.to_geographic(&MetricPoint::new(distance_km * b.sin(), distance_km * b.cos()))
    }
}

/// Geographic bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge
    pub min_lat: f64,
    /// Western edge
    pub min_lon: f64,
    /// Northern edge
    pub max_lat: f64,
    /// Eastern edge
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create a bounding box from its edges
    #[must_use]
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Smallest box containing every point
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.lat, first.lon, first.lat, first.lon);
        for p in iter {
            bbox.expand(p);
        }
        Some(bbox)
    }

    /// Grow the box to include `point`
    pub fn expand(&mut self, point: &GeoPoint) {
        self.min_lat = self.min_lat.min(point.lat);
        self.max_lat = self.max_lat.max(point.lat);
        self.min_lon = self.min_lon.min(point.lon);
        self.max_lon = self.max_lon.max(point.lon);
    }

    /// Union of two boxes
    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_lat.min(other.min_lat),
            self.min_lon.min(other.min_lon),
            self.max_lat.max(other.max_lat),
            self.max_lon.max(other.max_lon),
        )
    }

    /// Whether the point lies inside or on the edge of the box
    #[must_use]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }

    /// Midpoint of the box
    #[must_use]
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: 0.5 * (self.min_lat + self.max_lat),
            lon: 0.5 * (self.min_lon + self.max_lon),
        }
    }

    /// Latitude span, degrees
    #[must_use]
    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude span, degrees
    #[must_use]
    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Edges quantised to micro-degrees, stable enough to use as a map key
    #[must_use]
    pub fn quantized(&self) -> [i64; 4] {
        let q = |v: f64| (v * 1e6).round() as i64;
        [
            q(self.min_lat),
            q(self.min_lon),
            q(self.max_lat),
            q(self.max_lon),
        ]
    }
}

/// Wrap a longitude into [-180, 180)
#[must_use]
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped.is_finite() {
        wrapped
    } else {
        lon
    }
}

/// Central angle between two points, radians (haversine form)
fn central_angle(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = phi2 - phi1;
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}
