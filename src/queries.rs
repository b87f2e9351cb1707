// The six fixed aggregation queries
//
// Every sort ends with a deterministic tie-break so equal sums or averages
// always come out in the same order: group key ascending (industry, then
// country), or name ascending for individual startups.

use crate::db::Collection;
use crate::error::Result;
use crate::pipeline::{GroupSpec, Pipeline, SortOrder};
use crate::record::Status;
use crate::report::Table;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use SortOrder::{Ascending, Descending};

pub const DEFAULT_LIMIT: usize = 10;

// ============================================================================
// RESULT ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryFunding {
    pub industry: String,
    pub total_funding: f64,
    pub startup_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryFunding {
    pub country: String,
    pub total_funding: f64,
    pub average_funding: f64,
    pub startup_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub founded_year: i32,
    pub startup_count: u64,
    pub total_funding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopStartup {
    pub name: String,
    pub country: String,
    pub industry: Vec<String>,
    pub total_funding_usd: f64,
    pub founded_year: i32,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryCountry {
    pub industry: String,
    pub country: String,
    pub startup_count: u64,
    pub average_funding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusShare {
    pub status: Status,
    pub startup_count: u64,
    /// Share of all records, 0 to 100
    #[serde(default)]
    pub percentage: f64,
}

// ============================================================================
// PIPELINES
// ============================================================================

pub fn top_industries_pipeline(limit: usize) -> Pipeline {
    Pipeline::new()
        .unwind("industry")
        .group(
            GroupSpec::by(["industry"])
                .sum("total_funding", "total_funding_usd")
                .count("startup_count"),
        )
        .sort(&[("total_funding", Descending), ("industry", Ascending)])
        .limit(limit)
}

pub fn funding_by_country_pipeline() -> Pipeline {
    Pipeline::new()
        .group(
            GroupSpec::by(["country"])
                .sum("total_funding", "total_funding_usd")
                .avg("average_funding", "total_funding_usd")
                .count("startup_count"),
        )
        .sort(&[("total_funding", Descending), ("country", Ascending)])
}

pub fn year_over_year_pipeline() -> Pipeline {
    Pipeline::new()
        .group(
            GroupSpec::by(["founded_year"])
                .count("startup_count")
                .sum("total_funding", "total_funding_usd"),
        )
        .sort(&[("founded_year", Ascending)])
}

pub fn top_funded_pipeline(limit: usize) -> Pipeline {
    Pipeline::new()
        .sort(&[("total_funding_usd", Descending), ("name", Ascending)])
        .limit(limit)
        .project(&["name", "country", "industry", "total_funding_usd", "founded_year", "status"])
}

pub fn industry_country_pipeline() -> Pipeline {
    Pipeline::new()
        .unwind("industry")
        .group(
            GroupSpec::by(["industry", "country"])
                .count("startup_count")
                .avg("average_funding", "total_funding_usd"),
        )
        .sort(&[
            ("average_funding", Descending),
            ("industry", Ascending),
            ("country", Ascending),
        ])
}

pub fn status_distribution_pipeline() -> Pipeline {
    Pipeline::new()
        .group(GroupSpec::by(["status"]).count("startup_count"))
        .sort(&[("startup_count", Descending), ("status", Ascending)])
}

// ============================================================================
// TYPED RUNNERS
// ============================================================================

fn run<T: DeserializeOwned>(collection: &Collection<'_>, query: &str, pipeline: &Pipeline) -> Result<Vec<T>> {
    let rows = collection
        .aggregate(pipeline)?
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<T>, _>>()?;

    if rows.is_empty() {
        warn!(collection = collection.name(), query, "query returned no rows");
    }
    Ok(rows)
}

/// Funding summed per industry tag; a startup counts once for each of its tags
pub fn top_industries_by_funding(collection: &Collection<'_>, limit: usize) -> Result<Vec<IndustryFunding>> {
    run(collection, "top_industries", &top_industries_pipeline(limit))
}

pub fn funding_by_country(collection: &Collection<'_>) -> Result<Vec<CountryFunding>> {
    run(collection, "funding_by_country", &funding_by_country_pipeline())
}

pub fn year_over_year(collection: &Collection<'_>) -> Result<Vec<YearSummary>> {
    run(collection, "year_over_year", &year_over_year_pipeline())
}

pub fn top_funded_startups(collection: &Collection<'_>, limit: usize) -> Result<Vec<TopStartup>> {
    run(collection, "top_funded", &top_funded_pipeline(limit))
}

pub fn industry_by_country(collection: &Collection<'_>) -> Result<Vec<IndustryCountry>> {
    run(collection, "industry_by_country", &industry_country_pipeline())
}

/// Count per status with each status's share of the whole collection
pub fn status_distribution(collection: &Collection<'_>) -> Result<Vec<StatusShare>> {
    let mut rows: Vec<StatusShare> = run(collection, "status_distribution", &status_distribution_pipeline())?;

    let total: u64 = rows.iter().map(|r| r.startup_count).sum();
    for row in &mut rows {
        row.percentage = if total == 0 {
            0.0
        } else {
            row.startup_count as f64 * 100.0 / total as f64
        };
    }
    Ok(rows)
}

// ============================================================================
// QUERY SET
// ============================================================================

/// The fixed query set, addressable by name from the CLI and the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    TopIndustries,
    FundingByCountry,
    YearOverYear,
    TopFunded,
    IndustryByCountry,
    StatusDistribution,
}

impl Query {
    pub const ALL: [Query; 6] = [
        Query::TopIndustries,
        Query::FundingByCountry,
        Query::YearOverYear,
        Query::TopFunded,
        Query::IndustryByCountry,
        Query::StatusDistribution,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Query::TopIndustries => "top-industries",
            Query::FundingByCountry => "funding-by-country",
            Query::YearOverYear => "year-over-year",
            Query::TopFunded => "top-funded",
            Query::IndustryByCountry => "industry-by-country",
            Query::StatusDistribution => "status-distribution",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Query::TopIndustries => "Top industries by funding",
            Query::FundingByCountry => "Funding by country",
            Query::YearOverYear => "Startups founded per year",
            Query::TopFunded => "Top funded startups",
            Query::IndustryByCountry => "Industry by country",
            Query::StatusDistribution => "Status distribution",
        }
    }

    /// Whether `limit` applies
    pub fn takes_limit(&self) -> bool {
        matches!(self, Query::TopIndustries | Query::TopFunded)
    }

    /// Run the query and lay its rows out as a table
    pub fn run(&self, collection: &Collection<'_>, limit: usize) -> Result<Table> {
        let title = self.title();
        let table = match self {
            Query::TopIndustries => Table::from_rows(title, &top_industries_by_funding(collection, limit)?),
            Query::FundingByCountry => Table::from_rows(title, &funding_by_country(collection)?),
            Query::YearOverYear => Table::from_rows(title, &year_over_year(collection)?),
            Query::TopFunded => Table::from_rows(title, &top_funded_startups(collection, limit)?),
            Query::IndustryByCountry => Table::from_rows(title, &industry_by_country(collection)?),
            Query::StatusDistribution => Table::from_rows(title, &status_distribution(collection)?),
        };
        Ok(table)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Query {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Query::ALL
            .iter()
            .copied()
            .find(|q| q.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Query::ALL.iter().map(|q| q.name()).collect();
                format!("unknown query '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StartupStore;
    use crate::schema::SchemaValidator;
    use serde_json::{json, Value};

    fn store() -> StartupStore {
        StartupStore::open_in_memory()
            .unwrap()
            .with_validator(SchemaValidator::with_current_year(2026))
    }

    fn startup(name: &str, country: &str, year: i32, industry: &[&str], funding: f64, status: &str) -> Value {
        json!({
            "name": name,
            "founded_year": year,
            "country": country,
            "industry": industry,
            "total_funding_usd": funding,
            "status": status
        })
    }

    fn seed(coll: &Collection<'_>) {
        let records = vec![
            startup("PayCo", "USA", 2015, &["FinTech"], 100.0, "Operating"),
            startup("MixCo", "UK", 2015, &["FinTech", "AI"], 200.0, "Acquired"),
            startup("BrainCo", "USA", 2018, &["AI"], 300.0, "Operating"),
            startup("FlatCo", "Germany", 2012, &[], 300.0, "Closed"),
        ];
        let summary = coll.insert_many(&records).unwrap();
        assert_eq!(summary.inserted, 4);
    }

    #[test]
    fn test_industry_funding_flattens_tags() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        seed(&coll);

        let rows = top_industries_by_funding(&coll, DEFAULT_LIMIT).unwrap();
        assert_eq!(
            rows,
            vec![
                IndustryFunding { industry: "AI".into(), total_funding: 500.0, startup_count: 2 },
                IndustryFunding { industry: "FinTech".into(), total_funding: 300.0, startup_count: 2 },
            ]
        );

        let top_one = top_industries_by_funding(&coll, 1).unwrap();
        assert_eq!(top_one.len(), 1);
        assert_eq!(top_one[0].industry, "AI");
    }

    #[test]
    fn test_industry_ties_break_by_name() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        coll.insert_one(&startup("One", "USA", 2015, &["Robotics"], 50.0, "Operating")).unwrap();
        coll.insert_one(&startup("Two", "USA", 2015, &["Biotech"], 50.0, "Operating")).unwrap();

        let rows = top_industries_by_funding(&coll, DEFAULT_LIMIT).unwrap();
        let tags: Vec<&str> = rows.iter().map(|r| r.industry.as_str()).collect();
        assert_eq!(tags, vec!["Biotech", "Robotics"]);
    }

    #[test]
    fn test_funding_by_country() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        seed(&coll);

        let rows = funding_by_country(&coll).unwrap();
        let countries: Vec<&str> = rows.iter().map(|r| r.country.as_str()).collect();
        assert_eq!(countries, vec!["USA", "Germany", "UK"]);
        assert_eq!(rows[0].total_funding, 400.0);
        assert_eq!(rows[0].average_funding, 200.0);
        assert_eq!(rows[0].startup_count, 2);
    }

    #[test]
    fn test_year_over_year_ascending() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        seed(&coll);

        let rows = year_over_year(&coll).unwrap();
        assert_eq!(
            rows,
            vec![
                YearSummary { founded_year: 2012, startup_count: 1, total_funding: 300.0 },
                YearSummary { founded_year: 2015, startup_count: 2, total_funding: 300.0 },
                YearSummary { founded_year: 2018, startup_count: 1, total_funding: 300.0 },
            ]
        );
    }

    #[test]
    fn test_top_funded_ties_by_name() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        seed(&coll);

        let rows = top_funded_startups(&coll, 3).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["BrainCo", "FlatCo", "MixCo"]);
        assert_eq!(rows[0].industry, vec!["AI"]);
        assert_eq!(rows[1].status, Status::Closed);
    }

    #[test]
    fn test_industry_by_country() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        seed(&coll);

        let rows = industry_by_country(&coll).unwrap();
        let pairs: Vec<(&str, &str)> = rows.iter().map(|r| (r.industry.as_str(), r.country.as_str())).collect();
        assert_eq!(pairs, vec![("AI", "USA"), ("AI", "UK"), ("FinTech", "UK"), ("FinTech", "USA")]);
        assert_eq!(rows[0].average_funding, 300.0);
        assert_eq!(rows[1].average_funding, 200.0);
    }

    #[test]
    fn test_status_distribution_percentages() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        seed(&coll);

        let rows = status_distribution(&coll).unwrap();
        assert_eq!(rows[0].status, Status::Operating);
        assert_eq!(rows[0].startup_count, 2);
        assert_eq!(rows[0].percentage, 50.0);
        // Acquired and Closed tie on one each, alphabetical
        assert_eq!(rows[1].status, Status::Acquired);
        assert_eq!(rows[2].status, Status::Closed);
        let total: f64 = rows.iter().map(|r| r.percentage).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_collection_yields_empty_rows() {
        let store = store();
        let coll = store.collection("startups").unwrap();

        assert!(top_industries_by_funding(&coll, 5).unwrap().is_empty());
        assert!(status_distribution(&coll).unwrap().is_empty());
        for query in Query::ALL {
            assert!(query.run(&coll, DEFAULT_LIMIT).unwrap().is_empty(), "{}", query);
        }
    }

    #[test]
    fn test_query_names_round_trip() {
        for query in Query::ALL {
            assert_eq!(query.name().parse::<Query>().unwrap(), query);
        }
        assert_eq!("TOP_FUNDED".parse::<Query>().unwrap(), Query::TopFunded);
        assert!("bogus".parse::<Query>().is_err());
    }
}
