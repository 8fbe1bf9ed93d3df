use clap::{Args, Parser, Subcommand};

use review_lake_core::census::{
    CensusConfig, CensusError, Lookup, DEFAULT_EXAMPLES_PER_LABEL, DEFAULT_FEED_WINDOW,
    DEFAULT_SAMPLE_LIMIT,
};
use review_lake_core::scan::DEFAULT_PAGE_SIZE;
use review_lake_core::writer::DEFAULT_BATCH_SIZE;
use review_lake_core::{DriverConfig, RunMode};

#[derive(Debug, Parser)]
#[command(
    name = "review-lake",
    author,
    version,
    about = "Reconcile review documents written by every app generation to one schema",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify, repair and quarantine every review document
    Migrate(MigrateArgs),
    /// Sample the collection and report schema health and feed visibility
    Census(CensusArgs),
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Log planned patches without writing (the default)
    #[arg(long = "dry-run", conflicts_with = "commit")]
    pub dry_run: bool,
    /// Write patches to the store
    #[arg(long)]
    pub commit: bool,
    /// Resume after this document ID
    #[arg(long = "startAfter", visible_alias = "start-after", value_name = "ID")]
    pub start_after: Option<String>,
    /// Patches per write group, clamped to 1..=400
    #[arg(long = "batch", value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch: usize,
    /// Documents fetched per page, clamped to 1..=1000
    #[arg(long = "pageSize", visible_alias = "page-size", value_name = "N", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,
}

#[derive(Debug, Args)]
pub struct CensusArgs {
    /// Maximum documents to sample, clamped to 1..=20000
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SAMPLE_LIMIT)]
    pub limit: usize,
    /// Example IDs kept per generation
    #[arg(long, value_name = "N", default_value_t = DEFAULT_EXAMPLES_PER_LABEL)]
    pub examples: usize,
    /// Targeted lookup filter, e.g. 'userId == "u1"' (repeatable)
    #[arg(long = "where", value_name = "FILTER", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Size of the replayed feed window
    #[arg(long, value_name = "N", default_value_t = DEFAULT_FEED_WINDOW)]
    pub window: usize,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// A validated command, ready to run against the store.
#[derive(Debug)]
pub enum Prepared {
    Migrate(DriverConfig),
    Census { config: CensusConfig, json: bool },
}

impl MigrateArgs {
    pub fn mode(&self) -> RunMode {
        if self.commit {
            RunMode::Commit
        } else {
            RunMode::DryRun
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            mode: self.mode(),
            page_size: self.page_size,
            batch_size: self.batch,
            start_after: self.start_after.clone().filter(|id| !id.is_empty()),
            ..DriverConfig::default()
        }
    }
}

impl CensusArgs {
    pub fn census_config(&self) -> Result<CensusConfig, CensusError> {
        let lookups = self
            .filters
            .iter()
            .map(|filter| Lookup::parse(filter))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CensusConfig {
            limit: self.limit,
            examples_per_label: self.examples,
            lookups,
            feed_window: self.window,
            ..CensusConfig::default()
        })
    }
}

impl Command {
    /// Validate arguments without touching the environment or the store.
    pub fn prepare(&self) -> Result<Prepared, CensusError> {
        Ok(match self {
            Command::Migrate(args) => Prepared::Migrate(args.driver_config()),
            Command::Census(args) => Prepared::Census {
                config: args.census_config()?,
                json: args.json,
            },
        })
    }
}
