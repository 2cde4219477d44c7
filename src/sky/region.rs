//! Sky regions: a closed set of shapes sharing membership, area and sampling.
//!
//! Ellipses and polygons are defined in the tangent frame of their own centre,
//! so that membership, boundaries and areas are all consistent with each other.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::sky::coord::{SkyCoord, TangentFrame, rotate_plane};

/// Number of boundary vertices used when a curved shape is approximated by a polygon.
const BOUNDARY_VERTICES: usize = 128;

/// Vertices used for the ellipse area integral.
const AREA_VERTICES: usize = 720;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum SkyRegion {
    Circle {
        center: SkyCoord,
        /// Radius (degrees).
        radius: f64,
    },
    Ellipse {
        center: SkyCoord,
        /// Semi-major axis (degrees).
        semi_major: f64,
        /// Semi-minor axis (degrees).
        semi_minor: f64,
        /// Position angle of the major axis, east of north (degrees).
        angle: f64,
    },
    Polygon {
        vertices: Vec<SkyCoord>,
    },
}

impl SkyRegion {
    pub fn circle(center: SkyCoord, radius: f64) -> Result<Self, AnalysisError> {
        let region = SkyRegion::Circle { center, radius };
        region.validate()?;
        Ok(region)
    }

    pub fn ellipse(
        center: SkyCoord,
        semi_major: f64,
        semi_minor: f64,
        angle: f64,
    ) -> Result<Self, AnalysisError> {
        let region = SkyRegion::Ellipse {
            center,
            semi_major,
            semi_minor,
            angle,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn polygon(vertices: Vec<SkyCoord>) -> Result<Self, AnalysisError> {
        let region = SkyRegion::Polygon { vertices };
        region.validate()?;
        Ok(region)
    }

    /// Check shape parameters. Deserialized regions must pass through here too.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        match self {
            SkyRegion::Circle { radius, .. } => {
                if !(radius.is_finite() && *radius > 0.0 && *radius < 90.0) {
                    return Err(AnalysisError::InvalidRegion(format!(
                        "circle radius must be in (0, 90) deg, got {radius}"
                    )));
                }
            }
            SkyRegion::Ellipse {
                semi_major,
                semi_minor,
                angle,
                ..
            } => {
                if !(semi_major.is_finite()
                    && semi_minor.is_finite()
                    && angle.is_finite()
                    && *semi_minor > 0.0
                    && *semi_major >= *semi_minor
                    && *semi_major < 45.0)
                {
                    return Err(AnalysisError::InvalidRegion(format!(
                        "ellipse axes must satisfy 0 < minor <= major < 45 deg, got {semi_major}/{semi_minor}"
                    )));
                }
            }
            SkyRegion::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(AnalysisError::InvalidRegion(
                        "polygon needs at least 3 vertices".into(),
                    ));
                }
                let center = polygon_center(vertices);
                let frame = TangentFrame::new(center);
                if vertices.iter().any(|v| center.separation(v) >= 45.0 || frame.project(v).is_none()) {
                    return Err(AnalysisError::InvalidRegion(
                        "polygon vertices must lie within 45 deg of their centre".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn center(&self) -> SkyCoord {
        match self {
            SkyRegion::Circle { center, .. } | SkyRegion::Ellipse { center, .. } => *center,
            SkyRegion::Polygon { vertices } => polygon_center(vertices),
        }
    }

    /// Smallest radius (degrees) around [`SkyRegion::center`] enclosing the region.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            SkyRegion::Circle { radius, .. } => *radius,
            // atan(x) <= x, so the tangent-plane semi-major axis bounds the angular extent.
            SkyRegion::Ellipse { semi_major, .. } => *semi_major,
            SkyRegion::Polygon { vertices } => {
                let c = polygon_center(vertices);
                vertices.iter().map(|v| c.separation(v)).fold(0.0, f64::max)
            }
        }
    }

    pub fn contains(&self, p: &SkyCoord) -> bool {
        match self {
            SkyRegion::Circle { center, radius } => center.separation(p) <= *radius,
            SkyRegion::Ellipse {
                center,
                semi_major,
                semi_minor,
                angle,
            } => {
                let frame = TangentFrame::new(*center);
                let Some((x, y)) = frame.project(p) else {
                    return false;
                };
                let (s, c) = angle.to_radians().sin_cos();
                let along = x * s + y * c;
                let across = x * c - y * s;
                (along / semi_major).powi(2) + (across / semi_minor).powi(2) <= 1.0
            }
            SkyRegion::Polygon { vertices } => {
                let frame = TangentFrame::new(polygon_center(vertices));
                let Some(pt) = frame.project(p) else {
                    return false;
                };
                let Some(poly) = project_all(&frame, vertices) else {
                    return false;
                };
                point_in_polygon(pt, &poly)
            }
        }
    }

    /// Solid angle in steradians.
    pub fn solid_angle(&self) -> f64 {
        match self {
            SkyRegion::Circle { radius, .. } => {
                2.0 * std::f64::consts::PI * (1.0 - radius.to_radians().cos())
            }
            SkyRegion::Ellipse { .. } => spherical_polygon_area(&self.boundary(AREA_VERTICES)),
            SkyRegion::Polygon { vertices } => spherical_polygon_area(vertices),
        }
    }

    /// `n` boundary vertices in order around the region (polygons return their own vertices).
    pub fn boundary(&self, n: usize) -> Vec<SkyCoord> {
        let n = n.max(3);
        match self {
            SkyRegion::Circle { center, radius } => (0..n)
                .map(|k| center.offset_by(360.0 * k as f64 / n as f64, *radius))
                .collect(),
            SkyRegion::Ellipse {
                center,
                semi_major,
                semi_minor,
                angle,
            } => {
                let frame = TangentFrame::new(*center);
                (0..n)
                    .map(|k| {
                        let t = 2.0 * std::f64::consts::PI * k as f64 / n as f64;
                        // Point in the (major, minor) frame, then rotated onto the sky axes.
                        let along = semi_major * t.cos();
                        let across = semi_minor * t.sin();
                        let (x, y) = rotate_plane(across, along, *angle);
                        frame.deproject(x, y)
                    })
                    .collect()
            }
            SkyRegion::Polygon { vertices } => vertices.clone(),
        }
    }

    /// Congruent copy rotated about `pivot` by `angle` degrees.
    pub fn rotated_about(&self, pivot: &SkyCoord, angle: f64) -> SkyRegion {
        match self {
            SkyRegion::Circle { center, radius } => SkyRegion::Circle {
                center: center.rotated_about(pivot, angle),
                radius: *radius,
            },
            SkyRegion::Ellipse {
                center,
                semi_major,
                semi_minor,
                angle: pa,
            } => {
                let new_center = center.rotated_about(pivot, angle);
                let tip = center.offset_by(*pa, *semi_major).rotated_about(pivot, angle);
                SkyRegion::Ellipse {
                    center: new_center,
                    semi_major: *semi_major,
                    semi_minor: *semi_minor,
                    angle: new_center.position_angle(&tip),
                }
            }
            SkyRegion::Polygon { vertices } => SkyRegion::Polygon {
                vertices: vertices.iter().map(|v| v.rotated_about(pivot, angle)).collect(),
            },
        }
    }

    /// Whether the interiors of two regions intersect.
    ///
    /// Touching boundaries do not count as overlap.
    pub fn overlaps(&self, other: &SkyRegion) -> bool {
        let c1 = self.center();
        let c2 = other.center();
        let sep = c1.separation(&c2);
        if sep >= self.bounding_radius() + other.bounding_radius() {
            return false;
        }

        if let (SkyRegion::Circle { radius: r1, .. }, SkyRegion::Circle { radius: r2, .. }) =
            (self, other)
        {
            return sep < r1 + r2 - 1e-9;
        }

        let mid = SkyCoord::from_unit_vector(&(c1.to_unit_vector() + c2.to_unit_vector()));
        let frame = TangentFrame::new(mid);
        let (Some(a), Some(b)) = (
            project_all(&frame, &self.boundary(BOUNDARY_VERTICES)),
            project_all(&frame, &other.boundary(BOUNDARY_VERTICES)),
        ) else {
            return true;
        };
        polygons_overlap(&a, &b)
    }

    /// Whether the whole region lies within `radius` degrees of `center`.
    pub fn is_within(&self, center: &SkyCoord, radius: f64) -> bool {
        match self {
            SkyRegion::Circle { center: c, radius: r } => center.separation(c) + r <= radius,
            _ => self
                .boundary(BOUNDARY_VERTICES)
                .iter()
                .all(|p| center.separation(p) <= radius),
        }
    }
}

fn polygon_center(vertices: &[SkyCoord]) -> SkyCoord {
    let sum = vertices
        .iter()
        .fold(Vector3::zeros(), |acc, v| acc + v.to_unit_vector());
    SkyCoord::from_unit_vector(&sum)
}

fn project_all(frame: &TangentFrame, points: &[SkyCoord]) -> Option<Vec<(f64, f64)>> {
    points.iter().map(|p| frame.project(p)).collect()
}

/// Exact area of a spherical polygon (great-circle edges) via a signed triangle fan.
fn spherical_polygon_area(vertices: &[SkyCoord]) -> f64 {
    let apex = polygon_center(vertices).to_unit_vector();
    let n = vertices.len();
    let mut total = 0.0;
    for i in 0..n {
        let b = vertices[i].to_unit_vector();
        let c = vertices[(i + 1) % n].to_unit_vector();
        // Van Oosterom–Strackee solid angle of the triangle (apex, b, c).
        let numer = apex.dot(&b.cross(&c));
        let denom = 1.0 + apex.dot(&b) + b.dot(&c) + c.dot(&apex);
        total += 2.0 * numer.atan2(denom);
    }
    total.abs()
}

fn point_in_polygon(p: (f64, f64), poly: &[(f64, f64)]) -> bool {
    let (px, py) = p;
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (xi, yi) = poly[i];
        let (xj, yj) = poly[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn segments_cross(a1: (f64, f64), a2: (f64, f64), b1: (f64, f64), b2: (f64, f64)) -> bool {
    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }
    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);
    // Strict crossing only; collinear or touching edges are not an overlap.
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

fn polygons_overlap(a: &[(f64, f64)], b: &[(f64, f64)]) -> bool {
    for i in 0..a.len() {
        let a1 = a[i];
        let a2 = a[(i + 1) % a.len()];
        for j in 0..b.len() {
            if segments_cross(a1, a2, b[j], b[(j + 1) % b.len()]) {
                return true;
            }
        }
    }
    // No crossing edges: overlap only if one polygon sits inside the other.
    point_in_polygon(a[0], b) || point_in_polygon(b[0], a)
}
