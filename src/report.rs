// Reporting layer - query rows laid out as tables ready for charting

use crate::queries::{CountryFunding, IndustryCountry, IndustryFunding, StatusShare, TopStartup, YearSummary};
use crate::record::StartupRecord;
use serde::Serialize;
use std::fmt;

// ============================================================================
// CELLS AND TABLES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Number(f64),
    /// USD amount, shown abbreviated
    Money(f64),
    /// 0 to 100
    Percent(f64),
}

impl Cell {
    /// Numeric value for plotting; text has none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Text(_) => None,
            Cell::Integer(n) => Some(*n as f64),
            Cell::Number(x) | Cell::Money(x) | Cell::Percent(x) => Some(*x),
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Cell::Text(_))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Integer(n) => write!(f, "{}", n),
            Cell::Number(x) => write!(f, "{:.2}", x),
            Cell::Money(x) => f.write_str(&format_currency(*x)),
            Cell::Percent(x) => write!(f, "{:.1}%", x),
        }
    }
}

/// One query result row as table cells
pub trait ReportRow {
    fn columns() -> Vec<&'static str>;
    fn cells(&self) -> Vec<Cell>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn from_rows<R: ReportRow>(title: &str, rows: &[R]) -> Self {
        Table {
            title: title.to_string(),
            columns: R::columns().into_iter().map(String::from).collect(),
            rows: rows.iter().map(ReportRow::cells).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// (label, value) pairs for a bar or line chart. Rows whose value cell is
    /// not numeric are left out.
    pub fn series(&self, label_column: &str, value_column: &str) -> Option<Vec<(String, f64)>> {
        let label = self.column_index(label_column)?;
        let value = self.column_index(value_column)?;

        Some(
            self.rows
                .iter()
                .filter_map(|row| Some((row[label].to_string(), row[value].as_f64()?)))
                .collect(),
        )
    }

    /// Aligned plain-text rendering; numbers right-aligned
    pub fn render_text(&self) -> String {
        let mut out = format!("{}\n", self.title);

        if self.rows.is_empty() {
            out.push_str("(no rows)\n");
            return out;
        }

        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, header)| {
                rendered
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:<width$}", h, width = w))
            .collect();
        out.push_str(header.join("  ").trim_end());
        out.push('\n');

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');

        for (cells, texts) in self.rows.iter().zip(&rendered) {
            let line: Vec<String> = cells
                .iter()
                .zip(texts)
                .zip(&widths)
                .map(|((cell, text), w)| {
                    if cell.is_numeric() {
                        format!("{:>width$}", text, width = w)
                    } else {
                        format!("{:<width$}", text, width = w)
                    }
                })
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }

        out
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_text())
    }
}

// ============================================================================
// ROW LAYOUTS
// ============================================================================

impl ReportRow for IndustryFunding {
    fn columns() -> Vec<&'static str> {
        vec!["industry", "total_funding", "startups"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.industry.clone()),
            Cell::Money(self.total_funding),
            Cell::Integer(self.startup_count as i64),
        ]
    }
}

impl ReportRow for CountryFunding {
    fn columns() -> Vec<&'static str> {
        vec!["country", "total_funding", "average_funding", "startups"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.country.clone()),
            Cell::Money(self.total_funding),
            Cell::Money(self.average_funding),
            Cell::Integer(self.startup_count as i64),
        ]
    }
}

impl ReportRow for YearSummary {
    fn columns() -> Vec<&'static str> {
        vec!["founded_year", "startups", "total_funding"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.founded_year.into()),
            Cell::Integer(self.startup_count as i64),
            Cell::Money(self.total_funding),
        ]
    }
}

impl ReportRow for TopStartup {
    fn columns() -> Vec<&'static str> {
        vec!["name", "country", "industry", "total_funding", "founded_year", "status"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.name.clone()),
            Cell::Text(self.country.clone()),
            Cell::Text(self.industry.join(", ")),
            Cell::Money(self.total_funding_usd),
            Cell::Integer(self.founded_year.into()),
            Cell::Text(self.status.to_string()),
        ]
    }
}

impl ReportRow for IndustryCountry {
    fn columns() -> Vec<&'static str> {
        vec!["industry", "country", "startups", "average_funding"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.industry.clone()),
            Cell::Text(self.country.clone()),
            Cell::Integer(self.startup_count as i64),
            Cell::Money(self.average_funding),
        ]
    }
}

impl ReportRow for StatusShare {
    fn columns() -> Vec<&'static str> {
        vec!["status", "startups", "share"]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.status.to_string()),
            Cell::Integer(self.startup_count as i64),
            Cell::Percent(self.percentage),
        ]
    }
}

// ============================================================================
// FUNDING SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FundingStats {
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

impl FundingStats {
    /// All zeros for an empty slice
    pub fn from_records(records: &[StartupRecord]) -> Self {
        if records.is_empty() {
            return FundingStats::default();
        }

        let amounts = records.iter().map(|r| r.total_funding_usd);
        let total: f64 = amounts.clone().sum();

        FundingStats {
            count: records.len(),
            total,
            average: total / records.len() as f64,
            max: amounts.clone().fold(f64::MIN, f64::max),
            min: amounts.fold(f64::MAX, f64::min),
        }
    }
}

/// `$1.12B`, `$916.00M`, `$2.50K`, `$12.00`
pub fn format_currency(amount: f64) -> String {
    if amount >= 1_000_000_000.0 {
        format!("${:.2}B", amount / 1_000_000_000.0)
    } else if amount >= 1_000_000.0 {
        format!("${:.2}M", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("${:.2}K", amount / 1_000.0)
    } else {
        format!("${:.2}", amount)
    }
}
