// Startup Insights - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod attributes;   // Field registry
pub mod config;
pub mod data_quality; // Non-blocking consistency checks
pub mod db;           // Document store adapter
pub mod error;
pub mod loader;       // CSV / JSON / sample sources
pub mod logging;
pub mod pipeline;     // Aggregation stages
pub mod queries;      // The six fixed queries
pub mod record;
pub mod report;       // Tables for charting
pub mod schema;       // Validation before insert

// Re-export commonly used types
pub use attributes::{FieldDefinition, FieldRegistry, FieldType};
pub use config::{StoreConfig, StoreLocation};
pub use data_quality::{BatchSummary, QualityIssue, QualityReport, Severity};
pub use db::{Collection, CollectionStats, Cursor, Filter, InsertSummary, StartupStore};
pub use error::{Result, StoreError};
pub use loader::{detect_format, load_file, sample_startups, save_json, InputFormat, RecordSource};
pub use pipeline::{Accumulator, GroupSpec, Pipeline, SortOrder, Stage};
pub use queries::{
    CountryFunding, IndustryCountry, IndustryFunding, Query, StatusShare, TopStartup, YearSummary,
    DEFAULT_LIMIT,
};
pub use record::{FundingRound, StartupRecord, Status};
pub use report::{format_currency, Cell, FundingStats, ReportRow, Table};
pub use schema::{BatchValidation, Constraint, SchemaValidator, ValidationError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
