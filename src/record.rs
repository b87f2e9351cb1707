// Startup record model
// The typed form a candidate document takes once the validator accepts it

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Operating,
    Acquired,
    Closed,
    #[serde(rename = "IPO")]
    Ipo,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Operating, Status::Acquired, Status::Closed, Status::Ipo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Operating => "Operating",
            Status::Acquired => "Acquired",
            Status::Closed => "Closed",
            Status::Ipo => "IPO",
        }
    }

    /// Allowed spellings, in declaration order
    pub fn allowed() -> Vec<&'static str> {
        Status::ALL.iter().map(|s| s.as_str()).collect()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    /// Exact match only: "operating" is not a status.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

// ============================================================================
// FUNDING ROUND
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRound {
    /// Round label, e.g. "Seed" or "Series B"
    pub round: String,

    pub amount_usd: f64,

    /// ISO calendar date, serialized as YYYY-MM-DD
    pub date: NaiveDate,
}

// ============================================================================
// STARTUP RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupRecord {
    pub name: String,

    pub founded_year: i32,

    pub country: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Industry tags, order preserved
    #[serde(default)]
    pub industry: Vec<String>,

    #[serde(default)]
    pub funding_rounds: Vec<FundingRound>,

    #[serde(default)]
    pub investors: Vec<String>,

    pub total_funding_usd: f64,

    #[serde(default)]
    pub employee_count: u64,

    pub status: Status,
}

impl StartupRecord {
    /// Minimal record with every optional field at its default.
    pub fn new(
        name: impl Into<String>,
        founded_year: i32,
        country: impl Into<String>,
        total_funding_usd: f64,
        status: Status,
    ) -> Self {
        StartupRecord {
            name: name.into(),
            founded_year,
            country: country.into(),
            city: None,
            industry: Vec::new(),
            funding_rounds: Vec::new(),
            investors: Vec::new(),
            total_funding_usd,
            employee_count: 0,
            status,
        }
    }

    /// Builder: set city
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Builder: replace industry tags
    pub fn with_industry<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.industry = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: append one funding round
    pub fn with_round(mut self, round: impl Into<String>, amount_usd: f64, date: NaiveDate) -> Self {
        self.funding_rounds.push(FundingRound {
            round: round.into(),
            amount_usd,
            date,
        });
        self
    }

    /// Builder: replace investors
    pub fn with_investors<I, S>(mut self, investors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.investors = investors.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set employee count
    pub fn with_employees(mut self, employee_count: u64) -> Self {
        self.employee_count = employee_count;
        self
    }

    /// Sum of all round amounts, `None` when no rounds are recorded
    pub fn rounds_total(&self) -> Option<f64> {
        if self.funding_rounds.is_empty() {
            None
        } else {
            Some(self.funding_rounds.iter().map(|r| r.amount_usd).sum())
        }
    }

    /// Untyped document form, as handed to the validator and the store
    pub fn to_document(&self) -> serde_json::Value {
        // Plain strings, numbers and dates: serialization cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
