use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;

use startup_insights::{
    data_quality, format_currency, load_file, logging, sample_startups, save_json, Collection, Filter,
    FundingStats, InsertSummary, Query, StartupRecord, StartupStore, StoreConfig, DEFAULT_LIMIT,
    VERSION,
};

#[derive(Parser)]
#[command(name = "startup-insights")]
#[command(about = "Load startup records, run the aggregation queries, print report tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the collection and load the built-in sample startups
    Setup,
    /// Validate and insert records from a .csv or .json file
    Import {
        path: PathBuf,
    },
    /// Print one query (or all six) as a table
    Report {
        /// top-industries, funding-by-country, year-over-year, top-funded,
        /// industry-by-country or status-distribution
        query: Option<String>,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// List records matching the given filters
    Find {
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Earliest founding year, inclusive
        #[arg(long)]
        from: Option<i32>,
        /// Latest founding year, inclusive
        #[arg(long)]
        to: Option<i32>,
    },
    /// Write every stored record to a JSON file
    Export {
        path: PathBuf,
    },
    /// Collection size, indexes and funding summary
    Stats,
    /// Data-quality warnings for every stored record
    Quality,
    /// Delete every record in the collection
    Drop {
        /// Required: the drop cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let config = StoreConfig::from_env();
    let store = StartupStore::connect(&config).context("Failed to connect to the store")?;
    let collection = store.collection(&config.collection_name)?;

    match cli.command {
        Commands::Setup => run_setup(&collection),
        Commands::Import { path } => run_import(&collection, &path),
        Commands::Report { query, limit } => run_report(&collection, query.as_deref(), limit),
        Commands::Find {
            country,
            industry,
            status,
            from,
            to,
        } => {
            let mut filter = Filter::all().founded_between(from, to);
            filter.country = country;
            filter.industry = industry;
            filter.status = status;
            run_find(&collection, &filter)
        }
        Commands::Export { path } => run_export(&collection, &path),
        Commands::Stats => run_stats(&collection),
        Commands::Quality => run_quality(&collection),
        Commands::Drop { yes } => run_drop(&collection, yes),
    }
}

fn print_summary(summary: &InsertSummary) {
    println!("\n📊 Insertion Summary:");
    println!("   ✅ Inserted: {}", summary.inserted);
    println!("   ⚠️  Duplicates skipped: {}", summary.duplicates);
    println!("   ❌ Rejected: {}", summary.rejected.len());
    for (index, err) in &summary.rejected {
        println!("      record #{}: {}", index + 1, err);
    }
}

fn run_setup(collection: &Collection<'_>) -> Result<()> {
    println!("🚀 Startup Insights {} - setup", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📥 Loading sample startup data...");
    let summary = collection.insert_many(&sample_startups())?;
    print_summary(&summary);

    let stats = collection.stats()?;
    println!("\n📈 Collection '{}' holds {} startups", stats.collection, stats.total_documents);
    println!("   Indexes: {}", stats.indexes.join(", "));
    Ok(())
}

fn run_import(collection: &Collection<'_>, path: &Path) -> Result<()> {
    println!("📥 Loading data from {}...", path.display());
    let candidates = load_file(path)?;
    println!("✓ Loaded {} candidate records", candidates.len());

    if candidates.is_empty() {
        println!("⚠️  No data to insert");
        return Ok(());
    }

    let summary = collection.insert_many(&candidates)?;
    print_summary(&summary);
    println!(
        "\n📈 Total documents in collection: {}",
        collection.count_documents(&Filter::all())?
    );
    Ok(())
}

fn run_report(collection: &Collection<'_>, query: Option<&str>, limit: usize) -> Result<()> {
    let queries = match query {
        Some(name) => vec![name.parse::<Query>().map_err(anyhow::Error::msg)?],
        None => Query::ALL.to_vec(),
    };

    for query in queries {
        let table = query.run(collection, limit)?;
        if table.is_empty() {
            println!("⚠️  {}: no data found. Run `setup` or `import` first.\n", query.title());
            continue;
        }
        println!("{}", table.render_text());
    }
    Ok(())
}

fn load_all(collection: &Collection<'_>, filter: &Filter) -> Result<Vec<StartupRecord>> {
    let records = collection
        .find(filter)?
        .collect::<startup_insights::Result<Vec<_>>>()?;
    Ok(records)
}

fn run_find(collection: &Collection<'_>, filter: &Filter) -> Result<()> {
    let mut shown = 0;
    for record in collection.find(filter)? {
        let record = record?;
        shown += 1;
        println!(
            "   {}. {} ({}, {}) - {} [{}]",
            shown,
            record.name,
            record.country,
            record.founded_year,
            format_currency(record.total_funding_usd),
            record.status
        );
    }

    if shown == 0 {
        println!("⚠️  No startups match");
    }
    Ok(())
}

fn run_export(collection: &Collection<'_>, path: &Path) -> Result<()> {
    let records = load_all(collection, &Filter::all())?;
    save_json(path, &records)?;
    println!("💾 Exported {} startups to {}", records.len(), path.display());
    Ok(())
}

fn run_stats(collection: &Collection<'_>) -> Result<()> {
    let stats = collection.stats()?;
    println!("📊 Collection '{}'", stats.collection);
    println!("   Total documents: {}", stats.total_documents);
    println!("   Indexes: {}", stats.indexes.join(", "));

    let records = load_all(collection, &Filter::all())?;
    if records.is_empty() {
        println!("⚠️  No data found. Run `setup` first.");
        return Ok(());
    }

    let funding = FundingStats::from_records(&records);
    println!("\n💰 Total Funding: {}", format_currency(funding.total));
    println!("📈 Average Funding: {}", format_currency(funding.average));
    println!("🎯 Max Funding: {}", format_currency(funding.max));
    println!("📉 Min Funding: {}", format_currency(funding.min));
    Ok(())
}

fn run_quality(collection: &Collection<'_>) -> Result<()> {
    let records = load_all(collection, &Filter::all())?;
    let (reports, summary) = data_quality::check_batch(&records);

    for report in reports.iter().filter(|r| !r.is_clean()) {
        println!("🔍 {}", report.summary());
        for issue in &report.issues {
            println!("   [{:?}] {}: {} -> {}", issue.severity, issue.field, issue.issue, issue.recommendation);
        }
    }

    println!("\n✅ Clean records: {}/{}", summary.clean_records, summary.total_records);
    println!("⚠️  With warnings: {}", summary.records_with_warnings);
    println!("💸 Funding mismatches: {}", summary.funding_mismatches);
    Ok(())
}

fn run_drop(collection: &Collection<'_>, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to drop '{}' without --yes", collection.name());
    }

    warn!(collection = collection.name(), "dropping collection on request");
    collection.drop_collection()?;
    println!("🗑️  Collection '{}' dropped; indexes recreated.", collection.name());
    Ok(())
}
