// Data Quality Engine - conventions the schema does not enforce
//
// A record that passes validation can still be inconsistent: a funding total
// that disagrees with its rounds, rounds dated before the company existed,
// no industry tags (so it never appears in industry reports). These are
// reported, never rejected.

use crate::record::StartupRecord;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Largest gap between `total_funding_usd` and the sum of rounds still treated as equal
pub const FUNDING_TOLERANCE_USD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning, // Data disagrees with itself
    Info,    // Data is valid but could be improved
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

impl QualityIssue {
    fn warning(field: &str, issue: String, recommendation: &str) -> Self {
        QualityIssue {
            severity: Severity::Warning,
            field: field.to_string(),
            issue,
            recommendation: recommendation.to_string(),
        }
    }

    fn info(field: &str, issue: String, recommendation: &str) -> Self {
        QualityIssue {
            severity: Severity::Info,
            ..QualityIssue::warning(field, issue, recommendation)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub name: String,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} issue(s), {} warning(s)",
            self.name,
            self.issues.len(),
            self.warnings().count()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_records: usize,
    pub clean_records: usize,
    pub records_with_warnings: usize,
    pub funding_mismatches: usize,
}

// ============================================================================
// CHECKS
// ============================================================================

/// Run every quality check on one record
pub fn check(record: &StartupRecord) -> QualityReport {
    let mut issues = Vec::new();

    if let Some(mismatch) = funding_mismatch(record) {
        issues.push(QualityIssue::warning(
            "total_funding_usd",
            format!(
                "total {:.2} differs from sum of rounds {:.2}",
                record.total_funding_usd, mismatch
            ),
            "Recompute the total from funding_rounds or add the missing rounds",
        ));
    }

    for round in &record.funding_rounds {
        if i64::from(round.date.year()) < i64::from(record.founded_year) {
            issues.push(QualityIssue::warning(
                "funding_rounds",
                format!("round '{}' dated {} precedes founding in {}", round.round, round.date, record.founded_year),
                "Check the round date or the founding year",
            ));
        }
    }

    if record
        .funding_rounds
        .windows(2)
        .any(|pair| pair[1].date < pair[0].date)
    {
        issues.push(QualityIssue::info(
            "funding_rounds",
            "rounds are not in chronological order".to_string(),
            "Sort funding_rounds by date",
        ));
    }

    if record.industry.is_empty() {
        issues.push(QualityIssue::warning(
            "industry",
            "no industry tags".to_string(),
            "Tag the record so it shows up in industry reports",
        ));
    }

    let mut seen = HashSet::new();
    if record.investors.iter().any(|investor| !seen.insert(investor.as_str())) {
        issues.push(QualityIssue::info(
            "investors",
            "investor listed more than once".to_string(),
            "Deduplicate the investors list",
        ));
    }

    if record.city.is_none() {
        issues.push(QualityIssue::info(
            "city",
            "city not recorded".to_string(),
            "Add the headquarters city",
        ));
    }

    QualityReport {
        name: record.name.clone(),
        issues,
    }
}

/// Sum of rounds when it disagrees with the recorded total.
/// Records without rounds are never a mismatch.
pub fn funding_mismatch(record: &StartupRecord) -> Option<f64> {
    record
        .rounds_total()
        .filter(|sum| (sum - record.total_funding_usd).abs() > FUNDING_TOLERANCE_USD)
}

pub fn check_batch(records: &[StartupRecord]) -> (Vec<QualityReport>, BatchSummary) {
    let reports: Vec<QualityReport> = records.iter().map(check).collect();

    let summary = BatchSummary {
        total_records: reports.len(),
        clean_records: reports.iter().filter(|r| r.is_clean()).count(),
        records_with_warnings: reports.iter().filter(|r| r.warnings().next().is_some()).count(),
        funding_mismatches: records.iter().filter(|r| funding_mismatch(r).is_some()).count(),
    };

    (reports, summary)
}
