//! Planar polygons in a local metric frame

use crate::core_types::MetricPoint;
use std::fmt;

/// Why a ring cannot be used for membership tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolygonDefect {
    /// Fewer than three vertices
    TooFewVertices(usize),
    /// A vertex coordinate is NaN or infinite
    NonFinite,
    /// The ring encloses no area
    ZeroArea,
}

impl fmt::Display for PolygonDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolygonDefect::TooFewVertices(n) => write!(f, "ring has {n} vertices, need 3"),
            PolygonDefect::NonFinite => write!(f, "ring has non-finite coordinates"),
            PolygonDefect::ZeroArea => write!(f, "ring encloses zero area"),
        }
    }
}

/// Simple polygon stored as an open ring of km coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPolygon {
    vertices: Vec<MetricPoint>,
}

impl MetricPolygon {
    /// Validate and wrap a ring.
    ///
    /// A closing vertex equal to the first one is dropped.
    ///
    /// # Errors
    ///
    /// Returns the [`PolygonDefect`] that makes the ring unusable.
    pub fn new(mut vertices: Vec<MetricPoint>) -> Result<Self, PolygonDefect> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(PolygonDefect::TooFewVertices(vertices.len()));
        }
        if vertices.iter().any(|v| !(v.x.is_finite() && v.y.is_finite())) {
            return Err(PolygonDefect::NonFinite);
        }
        let polygon = Self { vertices };
        if polygon.area() <= f64::EPSILON {
            return Err(PolygonDefect::ZeroArea);
        }
        Ok(polygon)
    }

    /// Ring vertices
    #[must_use]
    pub fn vertices(&self) -> &[MetricPoint] {
        &self.vertices
    }

    /// Shoelace area, positive for counter-clockwise rings, km²
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        let twice: f64 = (0..n)
            .map(|i| {
                let (a, b) = (self.vertices[i], self.vertices[(i + 1) % n]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        0.5 * twice
    }

    /// Enclosed area, km²
    #[must_use]
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Lower-left and upper-right corners of the bounding rectangle
    #[must_use]
    pub fn bounds(&self) -> (MetricPoint, MetricPoint) {
        let mut lo = MetricPoint::new(f64::INFINITY, f64::INFINITY);
        let mut hi = MetricPoint::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &self.vertices {
            lo.x = lo.x.min(v.x);
            lo.y = lo.y.min(v.y);
            hi.x = hi.x.max(v.x);
            hi.y = hi.y.max(v.y);
        }
        (lo, hi)
    }

    /// Even-odd ray-casting membership test
    #[must_use]
    pub fn contains(&self, p: &MetricPoint) -> bool {
        let v = &self.vertices;
        let mut inside = false;
        let mut j = v.len() - 1;
        for i in 0..v.len() {
            let (a, b) = (v[i], v[j]);
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> MetricPolygon {
        MetricPolygon::new(vec![
            MetricPoint::new(0.0, 0.0),
            MetricPoint::new(side, 0.0),
            MetricPoint::new(side, side),
            MetricPoint::new(0.0, side),
        ])
        .unwrap()
    }

    #[test]
    fn test_square_membership() {
        let sq = square(2.0);
        assert!(sq.contains(&MetricPoint::new(1.0, 1.0)));
        assert!(!sq.contains(&MetricPoint::new(3.0, 1.0)));
        assert!(!sq.contains(&MetricPoint::new(1.0, -0.1)));
        assert_eq!(sq.area(), 4.0);
        assert!(sq.signed_area() > 0.0);
    }

    #[test]
    fn test_concave_ring() {
        // U shape: the notch between the arms is outside
        let u = MetricPolygon::new(vec![
            MetricPoint::new(0.0, 0.0),
            MetricPoint::new(3.0, 0.0),
            MetricPoint::new(3.0, 3.0),
            MetricPoint::new(2.0, 3.0),
            MetricPoint::new(2.0, 1.0),
            MetricPoint::new(1.0, 1.0),
            MetricPoint::new(1.0, 3.0),
            MetricPoint::new(0.0, 3.0),
        ])
        .unwrap();
        assert!(u.contains(&MetricPoint::new(0.5, 2.5)));
        assert!(u.contains(&MetricPoint::new(2.5, 2.5)));
        assert!(!u.contains(&MetricPoint::new(1.5, 2.0)));
        assert!(u.contains(&MetricPoint::new(1.5, 0.5)));
    }

    #[test]
    fn test_closed_ring_is_accepted() {
        let ring = vec![
            MetricPoint::new(0.0, 0.0),
            MetricPoint::new(1.0, 0.0),
            MetricPoint::new(0.0, 1.0),
            MetricPoint::new(0.0, 0.0),
        ];
        let tri = MetricPolygon::new(ring).unwrap();
        assert_eq!(tri.vertices().len(), 3);
        assert_eq!(tri.area(), 0.5);
    }

    #[test]
    fn test_defects() {
        assert_eq!(
            MetricPolygon::new(vec![MetricPoint::new(0.0, 0.0), MetricPoint::new(1.0, 1.0)]),
            Err(PolygonDefect::TooFewVertices(2))
        );
        assert_eq!(
            MetricPolygon::new(vec![
                MetricPoint::new(0.0, 0.0),
                MetricPoint::new(f64::NAN, 0.0),
                MetricPoint::new(0.0, 1.0),
            ]),
            Err(PolygonDefect::NonFinite)
        );
        assert_eq!(
            MetricPolygon::new(vec![
                MetricPoint::new(0.0, 0.0),
                MetricPoint::new(1.0, 1.0),
                MetricPoint::new(2.0, 2.0),
            ]),
            Err(PolygonDefect::ZeroArea)
        );
    }
}
