use anyhow::Result;
use migstep_core::{FailureLog, MigrationStatus, StepReport};

/// Render the applied/pending table, or the raw status as JSON.
pub fn format_status(status: &MigrationStatus, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(status)?);
    }

    let mut lines = vec![
        format!(
            "Current version: {} (previous {})",
            status.current_version, status.previous_version
        ),
        format!("Latest version:  {}", status.latest_version),
    ];
    if status.migrations.is_empty() {
        lines.push("No migrations found.".to_string());
        return Ok(lines.join("\n"));
    }

    let version_w = status
        .migrations
        .iter()
        .map(|m| m.version.to_string().len())
        .max()
        .unwrap_or(0)
        .max("Version".len());
    let row = |v: &str, s: &str, n: &str| format!("  {v:>version_w$}  {s:<7}  {n}");

    lines.push(String::new());
    lines.push(row("Version", "State", "Name"));
    lines.push(row(
        &"-".repeat(version_w),
        &"-".repeat(7),
        &"-".repeat(4),
    ));
    for m in &status.migrations {
        let state = if m.applied { "applied" } else { "pending" };
        lines.push(row(&m.version.to_string(), state, &m.name));
    }

    let pending = status.pending().len();
    lines.push(String::new());
    lines.push(if pending == 0 {
        "Up to date.".to_string()
    } else {
        format!(
            "{pending} pending migration{}.",
            if pending == 1 { "" } else { "s" }
        )
    });
    Ok(lines.join("\n"))
}

pub fn format_report(report: &StepReport, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }
    if report.is_noop() {
        return Ok(format!(
            "Nothing to do, database is at version {}.",
            report.last_version
        ));
    }

    let versions: Vec<String> = report.applied.iter().map(|v| v.to_string()).collect();
    let mut out = format!(
        "Stepped {} from {} to {}: {}",
        report.direction,
        report.from,
        report.last_version,
        versions.join(", ")
    );
    if report.is_degraded() {
        out.push_str(&format!(
            "\n{} statement(s) failed and were skipped.",
            report.captured.len()
        ));
    }
    Ok(out)
}

pub fn format_failures(failures: &FailureLog) -> String {
    let mut lines = vec![format!("Captured failures ({}):", failures.len())];
    lines.extend(failures.iter().map(|f| format!("  {f}")));
    lines.join("\n")
}
