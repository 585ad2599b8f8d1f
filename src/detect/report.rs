//! Human-readable rendering of a detection result.

use super::{DetectionResult, DetectionWindow, GrowthAnomaly, PackageRatio, Severity, Spike, Thresholds};

const TABLE_ROWS: usize = 10;
const CORRELATION_GROUPS: usize = 5;
const CORRELATION_NAMES: usize = 8;

/// Integer with thousands separators, e.g. `12,345`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn format_avg(value: f64) -> String {
    format_count(value.max(0.0).round() as u64)
}

/// Render the full report. Correlations and package spikes are noisy on their
/// own and only shown when the result is already high confidence.
pub fn format_report(result: &DetectionResult, window: &DetectionWindow, thresholds: &Thresholds) -> String {
    let mut out = String::new();
    let extreme = thresholds.extreme_growth_threshold;

    out.push_str("\n=== Anomaly Detection Report ===\n");
    out.push_str(&format!("Target month:    {}\n", window.target_month));
    out.push_str(&format!(
        "Baseline period: {} - {} ({} months)\n",
        window.baseline_start, window.baseline_end, thresholds.lookback_months
    ));

    render_base_packages(&mut out, result);
    render_growth(&mut out, "Mirror Anomalies", &result.mirror_anomalies);
    render_spikes(&mut out, "New Mirror Spikes", &result.new_mirror_spikes);
    render_architectures(&mut out, result);
    render_growth(&mut out, "Country Anomalies", &result.country_anomalies);

    if result.is_high_confidence(extreme) {
        render_correlations(&mut out, result);
        render_spikes(&mut out, "New Package Spikes", &result.new_package_spikes);
    }

    render_summary(&mut out, result, extreme);
    out
}

fn section(out: &mut String, title: &str) {
    out.push_str(&format!("\n--- {} ---\n", title));
}

fn render_ratios(out: &mut String, rows: &[PackageRatio]) {
    out.push_str(&format!("{:<30} | {:>12} | Ratio\n", "Package", "Count"));
    out.push_str(&format!("{:-<30}-|-{:-<12}-|-{:-<8}\n", "", "", ""));
    for p in rows {
        out.push_str(&format!("{:<30} | {:>12} | {:.2}x\n", p.name, format_count(p.count), p.ratio));
    }
}

fn render_base_packages(out: &mut String, result: &DetectionResult) {
    let base = &result.base_package_result;
    if !base.has_anomalies() {
        return;
    }

    section(out, "Base Package Anomalies");
    out.push_str(&format!("Base package median: {}\n", format_count(base.median)));

    if !base.outliers.is_empty() {
        out.push_str("[ERROR] Base packages exceeding threshold - HIGHLY suspicious:\n");
        render_ratios(out, &base.outliers);
    }

    if !base.packages_above_threshold.is_empty() {
        out.push_str("[WARNING] Non-base packages exceeding base threshold:\n");
        let shown = base.packages_above_threshold.len().min(TABLE_ROWS);
        render_ratios(out, &base.packages_above_threshold[..shown]);
    }
}

fn render_growth(out: &mut String, title: &str, anomalies: &[GrowthAnomaly]) {
    if anomalies.is_empty() {
        return;
    }

    section(out, title);
    out.push_str(&format!("{:<40} | {:>12} | {:>12} | Growth %\n", "Identifier", "Count", "Baseline Avg"));
    out.push_str(&format!("{:-<40}-|-{:-<12}-|-{:-<12}-|-{:-<10}\n", "", "", "", ""));
    for a in anomalies {
        out.push_str(&format!(
            "{:<40} | {:>12} | {:>12} | {:+.1}%\n",
            a.identifier,
            format_count(a.count),
            format_avg(a.baseline_avg),
            a.growth_percent
        ));
    }
}

fn render_architectures(out: &mut String, result: &DetectionResult) {
    if !result.has_architecture_anomalies() {
        return;
    }

    section(out, "Architecture Anomalies");
    out.push_str(&format!(
        "{:<6} | {:<15} | {:>12} | {:>12} | Growth %\n",
        "Type", "Architecture", "Count", "Baseline Avg"
    ));
    out.push_str(&format!("{:-<6}-|-{:-<15}-|-{:-<12}-|-{:-<12}-|-{:-<10}\n", "", "", "", "", ""));
    let rows = result
        .system_arch_anomalies
        .iter()
        .map(|a| ("system", a))
        .chain(result.os_arch_anomalies.iter().map(|a| ("os", a)));
    for (kind, a) in rows {
        out.push_str(&format!(
            "{:<6} | {:<15} | {:>12} | {:>12} | {:+.1}%\n",
            kind,
            a.identifier,
            format_count(a.count),
            format_avg(a.baseline_avg),
            a.growth_percent
        ));
    }
}

fn render_spikes(out: &mut String, title: &str, spikes: &[Spike]) {
    if spikes.is_empty() {
        return;
    }

    section(out, title);
    out.push_str(&format!("{:<40} | Count\n", "Identifier"));
    out.push_str(&format!("{:-<40}-|-{:-<12}\n", "", ""));
    for s in spikes.iter().take(TABLE_ROWS) {
        out.push_str(&format!("{:<40} | {}\n", s.identifier, format_count(s.count)));
    }
}

fn render_correlations(out: &mut String, result: &DetectionResult) {
    if result.count_correlations.is_empty() {
        return;
    }

    section(out, "Suspicious Count Correlations");
    for c in result.count_correlations.iter().take(CORRELATION_GROUPS) {
        let mut packages = c
            .packages
            .iter()
            .take(CORRELATION_NAMES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if c.packages.len() > CORRELATION_NAMES {
            packages.push_str("...");
        }
        let delta = format_count(c.delta.max(0) as u64);
        out.push_str(&format!("  Delta +{}: {} packages - {}\n", delta, c.package_count, packages));
    }
}

fn render_summary(out: &mut String, result: &DetectionResult, extreme: f64) {
    out.push('\n');

    match result.severity(extreme) {
        Severity::Critical => {
            let types = [
                result.has_mirror_anomalies(),
                result.has_architecture_anomalies(),
                result.has_base_package_anomalies(),
            ]
            .iter()
            .filter(|&&b| b)
            .count();
            out.push_str(&format!(
                "[ERROR] High-confidence anomalies detected ({} types) - requires investigation\n",
                types
            ));
        }
        Severity::Warning => {
            out.push_str("[WARNING] Minor anomalies detected (single mirror, architecture or country spike - may be legitimate)\n");
        }
        Severity::Info => {
            out.push_str("[OK] No high-confidence anomalies detected\n");
        }
    }

    let base = &result.base_package_result;
    out.push_str(&format!(
        "  Base package anomalies: {}\n",
        base.outliers.len() + base.packages_above_threshold.len()
    ));
    out.push_str(&format!(
        "  Mirror anomalies: {}\n",
        result.mirror_anomalies.len() + result.new_mirror_spikes.len()
    ));
    out.push_str(&format!(
        "  Architecture anomalies: {}\n",
        result.system_arch_anomalies.len() + result.os_arch_anomalies.len()
    ));
    out.push_str(&format!("  Country anomalies: {}\n", result.country_anomalies.len()));
}
