//! Tabulated response values over (true energy, field-of-view offset).
//!
//! Interpolation is linear in `ln(E)` and linear in offset, clamped at the
//! table edges. Range policy (what happens outside the table) belongs to the
//! individual response types.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseGrid {
    /// True energy nodes (TeV), strictly increasing.
    energy: Vec<f64>,
    /// Offset nodes (degrees), strictly increasing.
    offset: Vec<f64>,
    /// Row-major `[energy][offset]`.
    values: Vec<f64>,
}

impl ResponseGrid {
    pub fn new(energy: Vec<f64>, offset: Vec<f64>, values: Vec<f64>) -> Result<Self, AnalysisError> {
        if energy.is_empty() || offset.is_empty() {
            return Err(AnalysisError::InvalidResponse("response grid has no nodes".into()));
        }
        if energy.iter().any(|e| !(e.is_finite() && *e > 0.0)) || energy.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidResponse(
                "energy nodes must be positive and strictly increasing".into(),
            ));
        }
        if offset.iter().any(|o| !(o.is_finite() && *o >= 0.0)) || offset.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidResponse(
                "offset nodes must be non-negative and strictly increasing".into(),
            ));
        }
        if values.len() != energy.len() * offset.len() {
            return Err(AnalysisError::InvalidResponse(format!(
                "expected {}x{} values, got {}",
                energy.len(),
                offset.len(),
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidResponse("non-finite response value".into()));
        }
        Ok(Self { energy, offset, values })
    }

    /// Single-node grid: the same value everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            energy: vec![1.0],
            offset: vec![0.0],
            values: vec![value],
        }
    }

    /// Tabulate `f(energy, offset)` on the given nodes.
    pub fn from_fn(
        energy: Vec<f64>,
        offset: Vec<f64>,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, AnalysisError> {
        let mut values = Vec::with_capacity(energy.len() * offset.len());
        for &e in &energy {
            for &o in &offset {
                values.push(f(e, o));
            }
        }
        Self::new(energy, offset, values)
    }

    pub fn energy_nodes(&self) -> &[f64] {
        &self.energy
    }

    pub fn offset_nodes(&self) -> &[f64] {
        &self.offset
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.offset.len() + j]
    }

    pub fn interpolate(&self, energy: f64, offset: f64) -> f64 {
        let (i0, i1, ti) = bracket(&self.energy, energy, |e| e.ln());
        let (j0, j1, tj) = bracket(&self.offset, offset, |o| o);

        let v00 = self.at(i0, j0);
        let v01 = self.at(i0, j1);
        let v10 = self.at(i1, j0);
        let v11 = self.at(i1, j1);

        let v0 = v00 + (v01 - v00) * tj;
        let v1 = v10 + (v11 - v10) * tj;
        v0 + (v1 - v0) * ti
    }
}

/// Locate `x` between two nodes, returning their indices and the fractional
/// position in transformed coordinates. Clamps outside the node range.
fn bracket(nodes: &[f64], x: f64, transform: impl Fn(f64) -> f64) -> (usize, usize, f64) {
    let n = nodes.len();
    if n == 1 || x <= nodes[0] {
        return (0, 0, 0.0);
    }
    if x >= nodes[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    let hi = nodes.partition_point(|&v| v <= x).min(n - 1);
    let lo = hi - 1;
    let a = transform(nodes[lo]);
    let b = transform(nodes[hi]);
    let t = if b > a { (transform(x) - a) / (b - a) } else { 0.0 };
    (lo, hi, t.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn interpolates_log_energy_and_linear_offset() {
        let grid = ResponseGrid::from_fn(vec![1.0, 100.0], vec![0.0, 2.0], |e, o| e.log10() + o).unwrap();
        assert_abs_diff_eq!(grid.interpolate(10.0, 1.0), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.interpolate(1000.0, 0.5), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.interpolate(0.1, 5.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_shape_mismatch() {
        assert!(ResponseGrid::new(vec![1.0, 2.0], vec![0.0], vec![1.0]).is_err());
        assert!(ResponseGrid::new(vec![2.0, 1.0], vec![0.0], vec![1.0, 1.0]).is_err());
    }
}
