//! Derivative-free minimisation (Nelder–Mead simplex).
//!
//! The fit statistic is smooth but cheap gradients are not available for
//! every spectral shape, so we use a simplex search with the standard
//! coefficients (reflection 1, expansion 2, contraction ½, shrink ½).
//!
//! Convergence is declared when the spread of statistic values across the
//! simplex falls below `tolerance`. One restart from the best vertex guards
//! against simplex collapse.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Progress of a minimisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "kebab-case")]
pub enum FitState {
    Initial,
    Iterating { iteration: usize },
    Converged,
    Failed(FailureReason),
}

impl FitState {
    pub fn is_converged(&self) -> bool {
        matches!(self, FitState::Converged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    MaxIterations,
    Timeout,
    NonFiniteStatistic,
    SingularCovariance,
    NoSafeBins,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::MaxIterations => "iteration limit reached",
            FailureReason::Timeout => "time limit reached",
            FailureReason::NonFiniteStatistic => "statistic is not finite at the starting point",
            FailureReason::SingularCovariance => "covariance could not be estimated",
            FailureReason::NoSafeBins => "no safe bins to fit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Initial simplex step, relative to each coordinate (absolute when the coordinate is 0).
    pub initial_step: f64,
    pub max_duration: Option<Duration>,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-6,
            initial_step: 0.1,
            max_duration: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fval: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub state: FitState,
}

struct Simplex {
    points: Vec<Vec<f64>>,
    values: Vec<f64>,
}

impl Simplex {
    fn new(start: &[f64], step: f64, f: &mut impl FnMut(&[f64]) -> f64, evals: &mut usize) -> Self {
        let mut points = vec![start.to_vec()];
        for i in 0..start.len() {
            let mut p = start.to_vec();
            let delta = if p[i] != 0.0 { step * p[i].abs() } else { step };
            p[i] += delta;
            points.push(p);
        }
        let values = points
            .iter()
            .map(|p| {
                *evals += 1;
                sanitize(f(p))
            })
            .collect();
        Self { points, values }
    }

    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.points.len()).collect();
        order.sort_by(|&a, &b| self.values[a].total_cmp(&self.values[b]));
        self.points = order.iter().map(|&i| self.points[i].clone()).collect();
        self.values = order.iter().map(|&i| self.values[i]).collect();
    }

    fn spread(&self) -> f64 {
        let last = self.values.len() - 1;
        (self.values[last] - self.values[0]).abs()
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() { v } else { f64::INFINITY }
}

fn lerp(a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + t * (y - x)).collect()
}

/// Minimise `f` starting from `start`.
///
/// `on_state` observes every transition (`Initial`, each `Iterating`, and the
/// terminal state).
pub fn minimize(
    mut f: impl FnMut(&[f64]) -> f64,
    start: &[f64],
    options: &OptimizerOptions,
    mut on_state: impl FnMut(&FitState),
) -> Minimum {
    let started = Instant::now();
    let mut evaluations = 0usize;
    on_state(&FitState::Initial);

    let f0 = f(start);
    evaluations += 1;
    if !f0.is_finite() {
        let state = FitState::Failed(FailureReason::NonFiniteStatistic);
        on_state(&state);
        return Minimum {
            x: start.to_vec(),
            fval: f0,
            iterations: 0,
            evaluations,
            state,
        };
    }
    if start.is_empty() {
        on_state(&FitState::Converged);
        return Minimum {
            x: Vec::new(),
            fval: f0,
            iterations: 0,
            evaluations,
            state: FitState::Converged,
        };
    }

    let n = start.len();
    let mut simplex = Simplex::new(start, options.initial_step, &mut f, &mut evaluations);
    let mut iterations = 0usize;
    let mut restarted = false;

    let state = loop {
        simplex.sort();

        if simplex.spread() <= options.tolerance {
            if restarted {
                break FitState::Converged;
            }
            // Restart once around the best vertex; accept if nothing improves.
            restarted = true;
            let best = simplex.points[0].clone();
            let best_value = simplex.values[0];
            simplex = Simplex::new(&best, options.initial_step * 0.1, &mut f, &mut evaluations);
            simplex.sort();
            if simplex.values[0] >= best_value - options.tolerance && simplex.spread() <= options.tolerance {
                break FitState::Converged;
            }
            continue;
        }
        if iterations >= options.max_iterations {
            break FitState::Failed(FailureReason::MaxIterations);
        }
        if options.max_duration.is_some_and(|limit| started.elapsed() >= limit) {
            break FitState::Failed(FailureReason::Timeout);
        }

        iterations += 1;
        on_state(&FitState::Iterating { iteration: iterations });

        let worst = n;
        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex.points[..n].iter().map(|p| p[j]).sum::<f64>() / n as f64)
            .collect();

        let mut eval = |p: &[f64]| {
            evaluations += 1;
            sanitize(f(p))
        };

        let reflected = lerp(&centroid, &simplex.points[worst], -1.0);
        let f_r = eval(&reflected);

        if f_r < simplex.values[0] {
            let expanded = lerp(&centroid, &simplex.points[worst], -2.0);
            let f_e = eval(&expanded);
            if f_e < f_r {
                simplex.points[worst] = expanded;
                simplex.values[worst] = f_e;
            } else {
                simplex.points[worst] = reflected;
                simplex.values[worst] = f_r;
            }
            continue;
        }
        if f_r < simplex.values[n - 1] {
            simplex.points[worst] = reflected;
            simplex.values[worst] = f_r;
            continue;
        }

        let (contracted, f_c) = if f_r < simplex.values[worst] {
            let p = lerp(&centroid, &reflected, 0.5);
            let v = eval(&p);
            (p, v)
        } else {
            let p = lerp(&centroid, &simplex.points[worst], 0.5);
            let v = eval(&p);
            (p, v)
        };
        if f_c < simplex.values[worst].min(f_r) {
            simplex.points[worst] = contracted;
            simplex.values[worst] = f_c;
            continue;
        }

        let best = simplex.points[0].clone();
        for i in 1..=n {
            let p = lerp(&best, &simplex.points[i], 0.5);
            simplex.values[i] = eval(&p);
            simplex.points[i] = p;
        }
    };

    simplex.sort();
    on_state(&state);
    Minimum {
        x: simplex.points[0].clone(),
        fval: simplex.values[0],
        iterations,
        evaluations,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimizes_rosenbrock() {
        let rosen = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let opts = OptimizerOptions {
            tolerance: 1e-12,
            ..OptimizerOptions::default()
        };
        let m = minimize(rosen, &[-1.2, 1.0], &opts, |_| {});
        assert!(m.state.is_converged(), "{:?}", m.state);
        assert!((m.x[0] - 1.0).abs() < 1e-3);
        assert!((m.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn reports_the_state_sequence() {
        let mut states = Vec::new();
        let m = minimize(|x| (x[0] - 3.0).powi(2), &[0.0], &OptimizerOptions::default(), |s| {
            states.push(s.clone())
        });
        assert_eq!(states.first(), Some(&FitState::Initial));
        assert_eq!(states.last(), Some(&FitState::Converged));
        assert!(states.iter().any(|s| matches!(s, FitState::Iterating { .. })));
        assert!((m.x[0] - 3.0).abs() < 1e-2);
    }

    #[test]
    fn stops_at_the_iteration_limit() {
        let opts = OptimizerOptions {
            max_iterations: 3,
            tolerance: 0.0,
            ..OptimizerOptions::default()
        };
        let m = minimize(|x| x[0] * x[0] + x[1] * x[1], &[5.0, 5.0], &opts, |_| {});
        assert_eq!(m.state, FitState::Failed(FailureReason::MaxIterations));
        assert!(m.fval < 50.0);
    }

    #[test]
    fn stops_when_the_time_budget_is_spent() {
        let opts = OptimizerOptions {
            tolerance: 0.0,
            max_duration: Some(Duration::ZERO),
            ..OptimizerOptions::default()
        };
        let slow = |x: &[f64]| {
            std::thread::sleep(Duration::from_millis(1));
            x[0] * x[0] + x[1] * x[1]
        };
        let m = minimize(slow, &[5.0, 5.0], &opts, |_| {});
        assert_eq!(m.state, FitState::Failed(FailureReason::Timeout));
        assert_eq!(m.iterations, 0);
        // Best vertex of the starting simplex.
        assert_eq!(m.x, vec![5.0, 5.0]);
        assert_eq!(m.fval, 50.0);
    }

    #[test]
    fn non_finite_start_fails_immediately() {
        let m = minimize(|_| f64::NAN, &[1.0], &OptimizerOptions::default(), |_| {});
        assert_eq!(m.state, FitState::Failed(FailureReason::NonFiniteStatistic));
        assert_eq!(m.evaluations, 1);
    }
}
