//! Forward-folding likelihood fit of a spectral model to one or more datasets.
//!
//! Given:
//! - datasets with counts, exposure, dispersion and (optionally) off counts
//! - a spectral model with free and frozen parameters
//!
//! we minimise the summed fit statistic over the free parameters (in scaled
//! units, see [`Parameter::scale`](crate::models::Parameter)) and estimate the
//! covariance as `2 H⁻¹` from a finite-difference Hessian of the statistic.

use std::time::Duration;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::datasets::SpectrumDatasetOnOff;
use crate::error::AnalysisError;
use crate::fit::optimizer::{FailureReason, FitState, OptimizerOptions, minimize};
use crate::fit::stat::dataset_stat;
use crate::math::invert_spd;
use crate::models::SpectralModel;

/// Fit engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the spread of the statistic across the simplex.
    pub tolerance: f64,
    /// Wall-clock limit (seconds).
    pub max_seconds: Option<f64>,
    /// Relative step for the finite-difference Hessian.
    pub hessian_step: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-6,
            max_seconds: None,
            hessian_step: 1e-4,
        }
    }
}

impl FitConfig {
    fn optimizer_options(&self) -> OptimizerOptions {
        OptimizerOptions {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            max_duration: self
                .max_seconds
                .filter(|s| s.is_finite() && *s > 0.0)
                .map(Duration::from_secs_f64),
            ..OptimizerOptions::default()
        }
    }
}

/// Best-fit value of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub name: String,
    pub value: f64,
    /// One-sigma error; `None` for frozen parameters or when the covariance failed.
    pub error: Option<f64>,
    pub unit: String,
    pub frozen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub parameters: Vec<FitParameter>,
    /// Names of the free parameters, in covariance order.
    pub free_parameters: Vec<String>,
    /// Covariance of the free parameters (row-major). `None` if the Hessian could not be inverted.
    pub covariance: Option<Vec<f64>>,
    pub total_stat: f64,
    pub success: bool,
    pub state: FitState,
    pub message: String,
    pub iterations: usize,
    pub evaluations: usize,
    /// Model at the best-fit point.
    pub model: SpectralModel,
}

impl FitResult {
    pub fn parameter(&self, name: &str) -> Option<&FitParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Correlation between free parameters `i` and `j`.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.free_parameters.len();
        if i >= n || j >= n {
            return None;
        }
        let (vi, vj) = (cov[i * n + i], cov[j * n + j]);
        if vi <= 0.0 || vj <= 0.0 {
            return None;
        }
        Some(cov[i * n + j] / (vi * vj).sqrt())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fit {
    config: FitConfig,
}

impl Fit {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Fit `model` jointly to `datasets`.
    ///
    /// Errors only on unusable input; optimizer trouble is reported through
    /// [`FitResult::success`] and [`FitResult::state`] with the best iterate kept.
    pub fn run(
        &self,
        datasets: &[SpectrumDatasetOnOff],
        model: &SpectralModel,
    ) -> Result<FitResult, AnalysisError> {
        self.run_with_observer(datasets, model, |_| {})
    }

    pub fn run_with_observer(
        &self,
        datasets: &[SpectrumDatasetOnOff],
        model: &SpectralModel,
        on_state: impl FnMut(&FitState),
    ) -> Result<FitResult, AnalysisError> {
        if datasets.is_empty() {
            return Err(AnalysisError::EmptyStack);
        }
        model.validate()?;
        let free = model.free_indices();
        if datasets.iter().all(|d| d.n_safe_bins() == 0) {
            let reason = FailureReason::NoSafeBins;
            log::warn!("fit did not succeed: {reason}");
            return Ok(FitResult {
                parameters: model
                    .parameters()
                    .iter()
                    .map(|p| FitParameter {
                        name: p.name.clone(),
                        value: p.value,
                        error: None,
                        unit: p.unit.clone(),
                        frozen: p.frozen,
                    })
                    .collect(),
                free_parameters: free.iter().map(|&i| model.parameters()[i].name.clone()).collect(),
                covariance: None,
                total_stat: 0.0,
                success: false,
                state: FitState::Failed(reason),
                message: reason.to_string(),
                iterations: 0,
                evaluations: 0,
                model: model.clone(),
            });
        }

        let start: Vec<f64> = free.iter().map(|&i| model.parameters()[i].scaled_value()).collect();

        let objective = |x: &[f64]| total_stat(datasets, &with_scaled(model, &free, x));
        let minimum = minimize(objective, &start, &self.config.optimizer_options(), on_state);

        let best_model = with_scaled(model, &free, &minimum.x);
        let total = total_stat(datasets, &best_model);

        let (mut state, mut message) = match &minimum.state {
            FitState::Converged => (FitState::Converged, "optimization converged".to_string()),
            FitState::Failed(reason) => (minimum.state.clone(), reason.to_string()),
            other => (other.clone(), "optimization stopped".to_string()),
        };

        let hessian = numerical_hessian(
            |x| total_stat(datasets, &with_scaled(model, &free, x)),
            &minimum.x,
            self.config.hessian_step,
        );
        let covariance_scaled = match invert_spd(&hessian) {
            Ok(inv) => Some(inv * 2.0),
            Err(e) => {
                if state.is_converged() {
                    state = FitState::Failed(FailureReason::SingularCovariance);
                    message = format!("optimization converged but {e}");
                }
                None
            }
        };

        // Back to physical units.
        let scales: Vec<f64> = free
            .iter()
            .map(|&i| best_model.parameters()[i].effective_scale())
            .collect();
        let n = free.len();
        let covariance = covariance_scaled.map(|c| {
            let mut out = vec![0.0; n * n];
            for i in 0..n {
                for j in 0..n {
                    out[i * n + j] = c[(i, j)] * scales[i] * scales[j];
                }
            }
            out
        });

        let parameters = best_model
            .parameters()
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                let error = free.iter().position(|&i| i == idx).and_then(|k| {
                    covariance
                        .as_ref()
                        .map(|c| c[k * n + k])
                        .filter(|v| *v >= 0.0)
                        .map(f64::sqrt)
                });
                FitParameter {
                    name: p.name.clone(),
                    value: p.value,
                    error,
                    unit: p.unit.clone(),
                    frozen: p.frozen,
                }
            })
            .collect();

        let success = state.is_converged();
        if success {
            log::info!(
                "fit converged after {} iterations, stat = {total:.3}",
                minimum.iterations
            );
        } else {
            log::warn!("fit did not succeed: {message}");
        }

        Ok(FitResult {
            parameters,
            free_parameters: free.iter().map(|&i| model.parameters()[i].name.clone()).collect(),
            covariance,
            total_stat: total,
            success,
            state,
            message,
            iterations: minimum.iterations,
            evaluations: minimum.evaluations,
            model: best_model,
        })
    }
}

/// Summed statistic over datasets.
pub fn total_stat(datasets: &[SpectrumDatasetOnOff], model: &SpectralModel) -> f64 {
    datasets.iter().map(|d| dataset_stat(d, model)).sum()
}

fn with_scaled(model: &SpectralModel, free: &[usize], x: &[f64]) -> SpectralModel {
    let mut m = model.clone();
    for (&i, &xi) in free.iter().zip(x) {
        m.parameters_mut()[i].set_scaled_value(xi);
    }
    m
}

/// Central-difference Hessian.
fn numerical_hessian(f: impl Fn(&[f64]) -> f64, x: &[f64], rel_step: f64) -> DMatrix<f64> {
    let n = x.len();
    let h: Vec<f64> = x.iter().map(|v| rel_step * v.abs().max(1.0)).collect();
    let f0 = f(x);
    let mut hess = DMatrix::zeros(n, n);
    let mut p = x.to_vec();

    for i in 0..n {
        p[i] = x[i] + h[i];
        let fp = f(&p);
        p[i] = x[i] - h[i];
        let fm = f(&p);
        p[i] = x[i];
        hess[(i, i)] = (fp - 2.0 * f0 + fm) / (h[i] * h[i]);

        for j in (i + 1)..n {
            let mut corner = |si: f64, sj: f64| {
                p[i] = x[i] + si * h[i];
                p[j] = x[j] + sj * h[j];
                let v = f(&p);
                p[i] = x[i];
                p[j] = x[j];
                v
            };
            let v = (corner(1.0, 1.0) - corner(1.0, -1.0) - corner(-1.0, 1.0) + corner(-1.0, -1.0))
                / (4.0 * h[i] * h[j]);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }
    hess
}
