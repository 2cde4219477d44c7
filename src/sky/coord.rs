//! Celestial coordinates and the gnomonic tangent-plane frame.
//!
//! Angles at the API surface are degrees. The tangent frame is used wherever
//! we need planar geometry (membership, overlap, sampling grids): great circles
//! project to straight lines, and a rotation about the frame centre is an exact
//! planar rotation.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A position on the celestial sphere (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub lon: f64,
    pub lat: f64,
}

impl SkyCoord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon: lon.rem_euclid(360.0),
            lat,
        }
    }

    /// Angular distance to `other` (degrees), haversine form.
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let d_lat = lat2 - lat1;

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
    }

    /// Position angle of `other` as seen from `self`, east of north (degrees).
    pub fn position_angle(&self, other: &SkyCoord) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let y = d_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        y.atan2(x).to_degrees()
    }

    /// Point reached by travelling `separation` degrees along position angle `pa`.
    pub fn offset_by(&self, pa: f64, separation: f64) -> SkyCoord {
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();
        let theta = pa.to_radians();
        let delta = separation.to_radians();

        let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos();
        let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * sin_lat2);

        SkyCoord::new(lon2.to_degrees(), lat2.to_degrees())
    }

    /// Rotate this position about `pivot` by `angle` degrees (position angle increases).
    pub fn rotated_about(&self, pivot: &SkyCoord, angle: f64) -> SkyCoord {
        let sep = pivot.separation(self);
        if sep < 1e-12 {
            return *self;
        }
        let pa = pivot.position_angle(self);
        pivot.offset_by(pa + angle, sep)
    }

    pub fn to_unit_vector(&self) -> Vector3<f64> {
        let lon = self.lon.to_radians();
        let lat = self.lat.to_radians();
        Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }

    pub fn from_unit_vector(v: &Vector3<f64>) -> SkyCoord {
        let n = v.norm();
        if n <= 0.0 {
            return SkyCoord::new(0.0, 0.0);
        }
        let v = v / n;
        let lat = v.z.clamp(-1.0, 1.0).asin();
        let lon = v.y.atan2(v.x);
        SkyCoord::new(lon.to_degrees(), lat.to_degrees())
    }
}

impl std::fmt::Display for SkyCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}°, {:.4}°)", self.lon, self.lat)
    }
}

/// Gnomonic projection centred on a sky position.
///
/// Planar coordinates are returned in "tangent degrees": `x` towards east,
/// `y` towards north, scaled so that small offsets match angular degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentFrame {
    center: SkyCoord,
}

impl TangentFrame {
    pub fn new(center: SkyCoord) -> Self {
        Self { center }
    }

    pub fn center(&self) -> SkyCoord {
        self.center
    }

    /// Project onto the tangent plane. `None` for points on the far hemisphere.
    pub fn project(&self, p: &SkyCoord) -> Option<(f64, f64)> {
        let lat0 = self.center.lat.to_radians();
        let lat = p.lat.to_radians();
        let d_lon = (p.lon - self.center.lon).to_radians();

        let cos_c = lat0.sin() * lat.sin() + lat0.cos() * lat.cos() * d_lon.cos();
        if cos_c <= 1e-9 {
            return None;
        }
        let x = lat.cos() * d_lon.sin() / cos_c;
        let y = (lat0.cos() * lat.sin() - lat0.sin() * lat.cos() * d_lon.cos()) / cos_c;
        Some((x.to_degrees(), y.to_degrees()))
    }

    pub fn deproject(&self, x: f64, y: f64) -> SkyCoord {
        let x = x.to_radians();
        let y = y.to_radians();
        let rho = (x * x + y * y).sqrt();
        if rho < 1e-15 {
            return self.center;
        }
        let lat0 = self.center.lat.to_radians();
        let c = rho.atan();
        let (sin_c, cos_c) = c.sin_cos();

        let lat = (cos_c * lat0.sin() + y * sin_c * lat0.cos() / rho).clamp(-1.0, 1.0).asin();
        let d_lon = (x * sin_c).atan2(rho * lat0.cos() * cos_c - y * lat0.sin() * sin_c);
        SkyCoord::new(self.center.lon + d_lon.to_degrees(), lat.to_degrees())
    }

    /// Solid angle (sr) of a `dx × dy` (tangent degrees) cell centred on `(x, y)`.
    pub fn cell_solid_angle(x: f64, y: f64, dx: f64, dy: f64) -> f64 {
        let xr = x.to_radians();
        let yr = y.to_radians();
        let jac = (1.0 + xr * xr + yr * yr).powf(-1.5);
        dx.to_radians() * dy.to_radians() * jac
    }
}

/// Rotate planar tangent coordinates so that position angles increase by `angle` degrees.
pub fn rotate_plane(x: f64, y: f64, angle: f64) -> (f64, f64) {
    let (s, c) = angle.to_radians().sin_cos();
    (x * c + y * s, -x * s + y * c)
}
