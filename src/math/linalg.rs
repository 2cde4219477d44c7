//! Small dense linear algebra helpers.
//!
//! The fit engine inverts Hessians of a handful of free parameters. A valid
//! covariance needs a positive-definite Hessian, so we try Cholesky first and
//! only fall back to SVD to tell "singular" apart from "indefinite".

use nalgebra::DMatrix;

/// Why a Hessian could not be turned into a covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InversionError {
    Singular,
    NotPositiveDefinite,
}

impl std::fmt::Display for InversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InversionError::Singular => write!(f, "Hessian is singular"),
            InversionError::NotPositiveDefinite => write!(f, "Hessian is not positive definite"),
        }
    }
}

/// Invert a symmetric positive-definite matrix.
pub fn invert_spd(m: &DMatrix<f64>) -> Result<DMatrix<f64>, InversionError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(InversionError::Singular);
    }
    // Symmetrise to remove finite-difference noise.
    let sym = (m + m.transpose()) * 0.5;

    if let Some(chol) = sym.clone().cholesky() {
        let inv = chol.inverse();
        if inv.iter().all(|v| v.is_finite()) {
            return Ok(inv);
        }
    }

    let svd = sym.svd(false, false);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if max_sv <= 0.0 || min_sv <= max_sv * 1e-12 {
        Err(InversionError::Singular)
    } else {
        Err(InversionError::NotPositiveDefinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverts_spd_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let inv = invert_spd(&m).unwrap();
        let id = &m * &inv;
        assert!((id[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(id[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn detects_singular_and_indefinite() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(invert_spd(&singular), Err(InversionError::Singular));

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        assert_eq!(invert_spd(&indefinite), Err(InversionError::NotPositiveDefinite));
    }
}
