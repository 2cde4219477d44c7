//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the reduction and fitting code stays clean and testable
//! - output changes are localized

use crate::data::{ObsId, ObservationSummary};
use crate::datasets::{InfoRow, SpectrumDatasetOnOff};
use crate::domain::AnalysisConfig;
use crate::error::AnalysisError;
use crate::fit::FitResult;
use crate::report::BinResidual;
use crate::sky::{RegionGeom, SkyRegion};

/// Format the run header: geometry, selection and reduction outcome.
pub fn format_run_summary(
    config: &AnalysisConfig,
    geom: &RegionGeom,
    datasets: &[SpectrumDatasetOnOff],
    failures: &[(ObsId, AnalysisError)],
) -> String {
    let mut out = String::new();

    out.push_str("=== gspec - Region Spectral Analysis ===\n");
    out.push_str(&format!("On region: {}\n", describe_region(geom.region())));
    out.push_str(&format!(
        "Solid angle: {:.4e} sr\n",
        geom.region().solid_angle()
    ));
    out.push_str(&format!(
        "Energy: [{:.3}, {:.3}] TeV in {} bins | true: [{:.3}, {:.3}] TeV in {} bins\n",
        geom.energy().min(),
        geom.energy().max(),
        geom.energy().nbin(),
        geom.energy_true().min(),
        geom.energy_true().max(),
        geom.energy_true().nbin(),
    ));
    out.push_str(&format!(
        "Selection: cone {:.2}° around {}\n",
        config.selection.radius,
        config.selection_center()
    ));
    out.push_str(&format!(
        "Response: {}\n",
        if config.spectrum.use_region_center {
            "region centre".to_string()
        } else {
            format!(
                "region average (start {} pts/axis, tol {:.0e})",
                config.spectrum.sampling.initial_points, config.spectrum.sampling.tolerance
            )
        }
    ));

    let livetime: f64 = datasets.iter().map(|d| d.livetime()).sum();
    out.push_str(&format!(
        "Reduced: {} observation(s), livetime {:.2} h\n",
        datasets.len(),
        livetime / 3600.0
    ));

    let unconverged: Vec<&str> = datasets
        .iter()
        .filter(|d| d.meta().response_converged == Some(false))
        .map(|d| d.name())
        .collect();
    if !unconverged.is_empty() {
        out.push_str(&format!(
            "  (response sampling hit its budget) {}\n",
            unconverged.join(", ")
        ));
    }
    out.push_str(&format_failures(failures));
    out.push('\n');

    out
}

/// One line per excluded observation.
pub fn format_failures(failures: &[(ObsId, AnalysisError)]) -> String {
    let mut out = String::new();
    for (obs_id, err) in failures {
        out.push_str(&format!("  (skipped obs {obs_id}) {err}\n"));
    }
    out
}

/// Dataset statistics table.
pub fn format_info_table(rows: &[InfoRow]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<16} {:>5} {:>9} {:>9} {:>10} {:>10} {:>8} {:>9} {:>9}",
            "name", "n_obs", "counts", "off", "bkg", "excess", "sqrt_ts", "alpha", "live[h]"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<16} {:-<5} {:-<9} {:-<9} {:-<10} {:-<10} {:-<8} {:-<9} {:-<9}",
            "", "", "", "", "", "", "", "", ""
        ),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<16} {:>5} {:>9.0} {:>9} {:>10.2} {:>10.2} {:>8.2} {:>9} {:>9.3}",
                truncate(&r.name, 16),
                r.n_obs,
                r.counts,
                r.counts_off.map(|v| format!("{v:.0}")).unwrap_or_else(|| "-".into()),
                r.background,
                r.excess,
                r.sqrt_ts,
                r.alpha.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into()),
                r.livetime / 3600.0,
            ),
        );
    }
    out
}

/// Best-fit parameters and fit diagnostics.
pub fn format_fit_result(result: &FitResult) -> String {
    let mut out = String::new();

    let marker = if result.success { "*" } else { "!" };
    out.push_str(&format!(
        "{marker} Fit: {} ({}) | stat={:.3} | iterations={} evals={}\n",
        result.model.kind(),
        result.message,
        result.total_stat,
        result.iterations,
        result.evaluations
    ));

    push_line(
        &mut out,
        format!("{:<12} {:>14} {:>12} {:<14} {:<6}", "name", "value", "error", "unit", "frozen"),
    );
    push_line(
        &mut out,
        format!("{:-<12} {:-<14} {:-<12} {:-<14} {:-<6}", "", "", "", "", ""),
    );
    for p in &result.parameters {
        push_line(
            &mut out,
            format!(
                "{:<12} {:>14.5e} {:>12} {:<14} {:<6}",
                truncate(&p.name, 12),
                p.value,
                p.error.map(|e| format!("{e:.3e}")).unwrap_or_else(|| "-".into()),
                truncate(&p.unit, 14),
                if p.frozen { "yes" } else { "" },
            ),
        );
    }

    let n = result.free_parameters.len();
    if n > 1 && result.covariance.is_some() {
        out.push_str("Correlations:\n");
        for i in 0..n {
            for j in (i + 1)..n {
                if let Some(c) = result.correlation(i, j) {
                    out.push_str(&format!(
                        "- {} / {}: {c:+.3}\n",
                        result.free_parameters[i], result.free_parameters[j]
                    ));
                }
            }
        }
    }

    out
}

/// Counts versus prediction per energy bin. Unsafe bins are flagged.
pub fn format_residuals(rows: &[BinResidual]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:>9} {:>9} {:>9} {:>10} {:>10} {:<4}",
            "e_lo", "e_hi", "counts", "npred", "residual", "safe"
        ),
    );
    push_line(
        &mut out,
        format!("{:-<9} {:-<9} {:-<9} {:-<10} {:-<10} {:-<4}", "", "", "", "", "", ""),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:>9.3} {:>9.3} {:>9.0} {:>10.2} {:>10.2} {:<4}",
                r.energy_lo,
                r.energy_hi,
                r.counts,
                r.npred,
                r.residual,
                if r.safe { "" } else { "no" },
            ),
        );
    }
    out
}

/// Observation listing for `gspec info`.
pub fn format_observations(summaries: &[ObservationSummary]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:>8} {:>10} {:>10} {:>9} {:>8} {:<20}",
            "obs_id", "ra", "dec", "live[s]", "events", "tstart"
        ),
    );
    push_line(
        &mut out,
        format!("{:-<8} {:-<10} {:-<10} {:-<9} {:-<8} {:-<20}", "", "", "", "", "", ""),
    );
    for s in summaries {
        push_line(
            &mut out,
            format!(
                "{:>8} {:>10.4} {:>10.4} {:>9.1} {:>8} {:<20}",
                s.obs_id,
                s.pointing.lon,
                s.pointing.lat,
                s.livetime,
                s.n_events,
                s.tstart.format("%Y-%m-%d %H:%M:%S"),
            ),
        );
    }
    out
}

fn describe_region(region: &SkyRegion) -> String {
    match region {
        SkyRegion::Circle { center, radius } => format!("circle {center} r={radius:.3}°"),
        SkyRegion::Ellipse {
            center,
            semi_major,
            semi_minor,
            angle,
        } => format!("ellipse {center} a={semi_major:.3}° b={semi_minor:.3}° pa={angle:.1}°"),
        SkyRegion::Polygon { vertices } => {
            format!("polygon of {} vertices around {}", vertices.len(), region.center())
        }
    }
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
