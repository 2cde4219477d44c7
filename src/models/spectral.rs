//! Spectral models: differential photon flux as a function of true energy.
//!
//! All models share the same two primitives used by the simulator and the fit
//! engine:
//! - `evaluate(E)` in cm⁻² s⁻¹ TeV⁻¹
//! - `integral(lo, hi)` in cm⁻² s⁻¹
//!
//! Parameters live in a flat, ordered list so the optimizer can treat every
//! model the same way.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::math::{DEFAULT_INTERVALS, integrate_log_simpson};
use crate::models::Parameter;

const FLUX_UNIT: &str = "cm-2 s-1 TeV-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpectralKind {
    PowerLaw,
    LogParabola,
    ExpCutoffPowerLaw,
}

impl SpectralKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpectralKind::PowerLaw => "power-law",
            SpectralKind::LogParabola => "log-parabola",
            SpectralKind::ExpCutoffPowerLaw => "exp-cutoff-power-law",
        }
    }

    /// Parameter names in storage order.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            SpectralKind::PowerLaw => &["index", "amplitude", "reference"],
            SpectralKind::LogParabola => &["amplitude", "reference", "alpha", "beta"],
            SpectralKind::ExpCutoffPowerLaw => &["index", "amplitude", "reference", "lambda_"],
        }
    }
}

impl std::fmt::Display for SpectralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralModel {
    kind: SpectralKind,
    parameters: Vec<Parameter>,
}

impl SpectralModel {
    /// `φ(E) = A (E/E0)^-Γ`
    pub fn power_law(index: f64, amplitude: f64, reference: f64) -> Self {
        Self {
            kind: SpectralKind::PowerLaw,
            parameters: vec![
                Parameter::new("index", index, ""),
                Parameter::new("amplitude", amplitude, FLUX_UNIT).with_bounds(Some(0.0), None),
                Parameter::new("reference", reference, "TeV").frozen(),
            ],
        }
    }

    /// `φ(E) = A (E/E0)^(-α - β ln(E/E0))`
    pub fn log_parabola(amplitude: f64, reference: f64, alpha: f64, beta: f64) -> Self {
        Self {
            kind: SpectralKind::LogParabola,
            parameters: vec![
                Parameter::new("amplitude", amplitude, FLUX_UNIT).with_bounds(Some(0.0), None),
                Parameter::new("reference", reference, "TeV").frozen(),
                Parameter::new("alpha", alpha, ""),
                Parameter::new("beta", beta, ""),
            ],
        }
    }

    /// `φ(E) = A (E/E0)^-Γ exp(-λ E)`
    pub fn exp_cutoff_power_law(index: f64, amplitude: f64, reference: f64, lambda: f64) -> Self {
        Self {
            kind: SpectralKind::ExpCutoffPowerLaw,
            parameters: vec![
                Parameter::new("index", index, ""),
                Parameter::new("amplitude", amplitude, FLUX_UNIT).with_bounds(Some(0.0), None),
                Parameter::new("reference", reference, "TeV").frozen(),
                Parameter::new("lambda_", lambda, "TeV-1"),
            ],
        }
    }

    /// Check that deserialized parameters match the model kind.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let names = self.kind.parameter_names();
        if self.parameters.len() != names.len()
            || self.parameters.iter().zip(names).any(|(p, n)| p.name != *n)
        {
            return Err(AnalysisError::InvalidConfig(format!(
                "{} expects parameters {:?}",
                self.kind, names
            )));
        }
        if let Some(p) = self.parameters.iter().find(|p| !p.value.is_finite()) {
            return Err(AnalysisError::InvalidConfig(format!(
                "parameter {} is not finite",
                p.name
            )));
        }
        if self.value("reference") <= 0.0 {
            return Err(AnalysisError::InvalidConfig("reference energy must be > 0".into()));
        }
        Ok(())
    }

    pub fn kind(&self) -> SpectralKind {
        self.kind
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    fn value(&self, name: &str) -> f64 {
        self.parameter(name).map(|p| p.value).unwrap_or(f64::NAN)
    }

    /// Indices of free (non-frozen) parameters.
    pub fn free_indices(&self) -> Vec<usize> {
        (0..self.parameters.len())
            .filter(|&i| !self.parameters[i].frozen)
            .collect()
    }

    /// Differential flux at `energy` (TeV).
    pub fn evaluate(&self, energy: f64) -> f64 {
        let p = &self.parameters;
        match self.kind {
            SpectralKind::PowerLaw => {
                let (index, amplitude, reference) = (p[0].value, p[1].value, p[2].value);
                amplitude * (energy / reference).powf(-index)
            }
            SpectralKind::LogParabola => {
                let (amplitude, reference, alpha, beta) =
                    (p[0].value, p[1].value, p[2].value, p[3].value);
                let x = energy / reference;
                amplitude * x.powf(-alpha - beta * x.ln())
            }
            SpectralKind::ExpCutoffPowerLaw => {
                let (index, amplitude, reference, lambda) =
                    (p[0].value, p[1].value, p[2].value, p[3].value);
                amplitude * (energy / reference).powf(-index) * (-lambda * energy).exp()
            }
        }
    }

    /// Integral flux between `lo` and `hi` (TeV).
    pub fn integral(&self, lo: f64, hi: f64) -> f64 {
        match self.kind {
            SpectralKind::PowerLaw => {
                let p = &self.parameters;
                power_law_integral(p[0].value, p[1].value, p[2].value, lo, hi)
            }
            _ => integrate_log_simpson(|e| self.evaluate(e), lo, hi, DEFAULT_INTERVALS),
        }
    }

    /// Integral flux over each bin of `edges`.
    pub fn integrate_edges(&self, edges: &[f64]) -> Vec<f64> {
        edges.windows(2).map(|w| self.integral(w[0], w[1])).collect()
    }
}

fn power_law_integral(index: f64, amplitude: f64, reference: f64, lo: f64, hi: f64) -> f64 {
    if !(lo > 0.0 && hi > lo) {
        return 0.0;
    }
    let g = 1.0 - index;
    if g.abs() < 1e-10 {
        amplitude * reference * (hi / lo).ln()
    } else {
        amplitude * reference / g * ((hi / reference).powf(g) - (lo / reference).powf(g))
    }
}
