//! Named model parameters.

use serde::{Deserialize, Serialize};

/// A model parameter with optional bounds.
///
/// The optimizer works on `value / scale` so that amplitudes around `1e-11`
/// and indices around `2` move on comparable step sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            min: None,
            max: None,
            frozen: false,
            scale: auto_scale(value),
        }
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Clamp `value` into the parameter bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.min {
            v = v.max(lo);
        }
        if let Some(hi) = self.max {
            v = v.min(hi);
        }
        v
    }

    pub fn scaled_value(&self) -> f64 {
        self.value / self.effective_scale()
    }

    pub fn set_scaled_value(&mut self, x: f64) {
        self.value = self.clamp(x * self.effective_scale());
    }

    pub fn effective_scale(&self) -> f64 {
        if self.scale.is_finite() && self.scale != 0.0 { self.scale } else { 1.0 }
    }

    /// Re-derive the scale from the current value.
    pub fn autoscale(&mut self) {
        self.scale = auto_scale(self.value);
    }
}

/// Power of ten closest below `|value|`, or 1 for zero.
fn auto_scale(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        1.0
    } else {
        10f64.powf(value.abs().log10().floor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scale_tracks_magnitude() {
        let p = Parameter::new("amplitude", 3.5e-11, "cm-2 s-1 TeV-1");
        assert_relative_eq!(p.scale, 1e-11, max_relative = 1e-12);
        assert_relative_eq!(p.scaled_value(), 3.5, max_relative = 1e-12);
        assert_eq!(Parameter::new("x", 0.0, "").scale, 1.0);
    }

    #[test]
    fn bounds_are_enforced_on_set() {
        let mut p = Parameter::new("index", 2.0, "").with_bounds(Some(0.0), Some(5.0));
        p.set_scaled_value(7.0);
        assert_eq!(p.value, 5.0);
        p.set_scaled_value(-1.0);
        assert_eq!(p.value, 0.0);
    }
}
