// Record sources - CSV, JSON and the built-in sample set
//
// Sources only turn files into candidate documents. Nothing is checked here:
// every candidate still goes through the validator on insert.

use crate::record::StartupRecord;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

/// Expected CSV header, in order
pub const CSV_COLUMNS: [&str; 8] = [
    "name",
    "founded_year",
    "country",
    "city",
    "industry",
    "total_funding_usd",
    "employee_count",
    "status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            InputFormat::Csv => "CSV",
            InputFormat::Json => "JSON",
        }
    }
}

/// Anything that can produce candidate documents from a file
pub trait RecordSource {
    fn load(&self, path: &Path) -> Result<Vec<Value>>;

    fn format(&self) -> InputFormat;
}

pub struct CsvSource;

pub struct JsonSource;

impl RecordSource for CsvSource {
    fn load(&self, path: &Path) -> Result<Vec<Value>> {
        let file = File::open(path).with_context(|| format!("Failed to open CSV file {}", path.display()))?;
        read_csv(file).with_context(|| format!("Failed to read CSV file {}", path.display()))
    }

    fn format(&self) -> InputFormat {
        InputFormat::Csv
    }
}

impl RecordSource for JsonSource {
    fn load(&self, path: &Path) -> Result<Vec<Value>> {
        let file = File::open(path).with_context(|| format!("Failed to open JSON file {}", path.display()))?;
        read_json(BufReader::new(file)).with_context(|| format!("Failed to read JSON file {}", path.display()))
    }

    fn format(&self) -> InputFormat {
        InputFormat::Json
    }
}

/// Pick the format from the file extension
pub fn detect_format(path: &Path) -> Option<InputFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(InputFormat::Csv),
        "json" => Some(InputFormat::Json),
        _ => None,
    }
}

pub fn get_source(format: InputFormat) -> Box<dyn RecordSource> {
    match format {
        InputFormat::Csv => Box::new(CsvSource),
        InputFormat::Json => Box::new(JsonSource),
    }
}

/// Load a CSV or JSON file, chosen by extension
pub fn load_file(path: &Path) -> Result<Vec<Value>> {
    let format = detect_format(path)
        .ok_or_else(|| anyhow!("Unsupported file type: {} (expected .csv or .json)", path.display()))?;
    let documents = get_source(format).load(path)?;
    tracing::info!(path = %path.display(), format = format.name(), count = documents.len(), "loaded candidates");
    Ok(documents)
}

// ============================================================================
// CSV
// ============================================================================

/// Read CSV rows into candidate documents.
///
/// Empty cells are left out. `industry` is a comma-separated tag list.
/// Numeric columns become JSON numbers when they parse and stay strings
/// otherwise, so the validator can name the bad field.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Value>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().context("Missing CSV header")?.clone();

    for required in ["name", "founded_year", "country", "total_funding_usd", "status"] {
        if !headers.iter().any(|h| h == required) {
            bail!("CSV header lacks column '{}'", required);
        }
    }
    for extra in headers.iter().filter(|h| !CSV_COLUMNS.contains(h)) {
        tracing::warn!(column = extra, "unexpected CSV column, values ignored on insert");
    }

    let mut documents = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("Bad CSV row {}", line + 2))?;
        let mut doc = Map::new();

        for (header, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() {
                continue;
            }
            doc.insert(header.to_string(), csv_cell(header, cell));
        }

        documents.push(Value::Object(doc));
    }

    Ok(documents)
}

fn csv_cell(header: &str, cell: &str) -> Value {
    match header {
        "industry" => Value::Array(split_tags(cell).into_iter().map(Value::String).collect()),
        "founded_year" | "employee_count" => cell
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(cell.to_string())),
        "total_funding_usd" => parse_amount(cell).unwrap_or_else(|| Value::String(cell.to_string())),
        _ => Value::String(cell.to_string()),
    }
}

/// Whole amounts stay integers; others become floats
fn parse_amount(cell: &str) -> Option<Value> {
    if let Ok(n) = cell.parse::<i64>() {
        return Some(Value::from(n));
    }
    cell.parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .map(Value::from)
}

/// `"AI, FinTech,"` becomes `["AI", "FinTech"]`
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================================
// JSON
// ============================================================================

/// The file must hold a top-level array of objects
pub fn read_json<R: Read>(reader: R) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_reader(reader).context("Invalid JSON")?;
    match value {
        Value::Array(items) => Ok(items),
        other => bail!("Expected a JSON array of startups, found {}", json_kind(&other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write records as a pretty-printed JSON array
pub fn save_json(path: &Path, records: &[StartupRecord]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), records).context("Failed to write JSON")?;
    Ok(())
}

// ============================================================================
// SAMPLE DATA
// ============================================================================

/// Five well-known startups for a first run
pub fn sample_startups() -> Vec<Value> {
    vec![
        json!({
            "name": "OpenAI",
            "founded_year": 2015,
            "country": "USA",
            "city": "San Francisco",
            "industry": ["AI", "Machine Learning"],
            "funding_rounds": [
                {"round": "Seed", "amount_usd": 120000000, "date": "2015-12-11"},
                {"round": "Series A", "amount_usd": 1000000000, "date": "2019-07-22"}
            ],
            "investors": ["Khosla Ventures", "Microsoft", "Reid Hoffman"],
            "total_funding_usd": 1120000000,
            "employee_count": 500,
            "status": "Operating"
        }),
        json!({
            "name": "Stripe",
            "founded_year": 2010,
            "country": "USA",
            "city": "San Francisco",
            "industry": ["FinTech", "Payments"],
            "funding_rounds": [
                {"round": "Series A", "amount_usd": 2000000, "date": "2011-05-01"},
                {"round": "Series B", "amount_usd": 20000000, "date": "2012-07-01"},
                {"round": "Series C", "amount_usd": 80000000, "date": "2014-01-01"}
            ],
            "investors": ["Sequoia Capital", "Andreessen Horowitz", "Elon Musk"],
            "total_funding_usd": 2200000000u64,
            "employee_count": 7000,
            "status": "Operating"
        }),
        json!({
            "name": "Revolut",
            "founded_year": 2015,
            "country": "UK",
            "city": "London",
            "industry": ["FinTech", "Banking"],
            "funding_rounds": [
                {"round": "Seed", "amount_usd": 1000000, "date": "2015-07-01"},
                {"round": "Series A", "amount_usd": 10000000, "date": "2016-07-01"},
                {"round": "Series B", "amount_usd": 66000000, "date": "2017-07-01"},
                {"round": "Series C", "amount_usd": 250000000, "date": "2018-04-01"}
            ],
            "investors": ["Index Ventures", "Balderton Capital", "DST Global"],
            "total_funding_usd": 916000000,
            "employee_count": 5000,
            "status": "Operating"
        }),
        json!({
            "name": "Grab",
            "founded_year": 2012,
            "country": "Singapore",
            "city": "Singapore",
            "industry": ["Transportation", "FinTech"],
            "funding_rounds": [
                {"round": "Series A", "amount_usd": 10000000, "date": "2013-01-01"},
                {"round": "Series B", "amount_usd": 90000000, "date": "2014-12-01"},
                {"round": "Series F", "amount_usd": 2500000000u64, "date": "2018-03-01"}
            ],
            "investors": ["SoftBank", "Toyota", "Microsoft"],
            "total_funding_usd": 12300000000u64,
            "employee_count": 8000,
            "status": "Operating"
        }),
        json!({
            "name": "Nubank",
            "founded_year": 2013,
            "country": "Brazil",
            "city": "São Paulo",
            "industry": ["FinTech", "Banking"],
            "funding_rounds": [
                {"round": "Series A", "amount_usd": 14600000, "date": "2014-01-01"},
                {"round": "Series B", "amount_usd": 30000000, "date": "2014-10-01"},
                {"round": "Series G", "amount_usd": 400000000, "date": "2019-07-01"}
            ],
            "investors": ["Sequoia Capital", "Tiger Global", "Tencent"],
            "total_funding_usd": 2100000000,
            "employee_count": 4000,
            "status": "Operating"
        }),
    ]
}
