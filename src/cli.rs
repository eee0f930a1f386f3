use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::catalog::Locale;
use crate::config::SeederConfig;

#[derive(Parser, Debug)]
#[command(name = "guildbank-item-seeder")]
#[command(version, about = "Populate the guild bank item catalog from the Wowhead XML feed")]
pub struct Cli {
    /// JSON config file (default: config.json in the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite catalog database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Concurrent requests (and store sessions for import)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Show a full-screen progress dashboard; logs go to a file
    #[arg(long, global = true)]
    pub tui: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import every item not yet in the catalog, resuming after the highest stored id
    Import {
        /// First id of the range
        #[arg(long)]
        first: Option<i64>,

        /// Last id of the range (inclusive)
        #[arg(long)]
        last: Option<i64>,

        /// Ids each worker processes between commits
        #[arg(long)]
        commit_every: Option<usize>,

        /// Extra ids outside the range (comma-separated)
        #[arg(long, value_delimiter = ',')]
        special: Option<Vec<i64>>,
    },

    /// Refresh class and subclass of every stored item
    Update {
        /// Items per commit
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Fill in translated item names
    Backfill {
        /// Locales to fetch (comma-separated, e.g. ko,pt)
        #[arg(short, long, value_delimiter = ',')]
        locale: Option<Vec<Locale>>,

        /// Locale whose missing names mark where to resume
        #[arg(long)]
        marker: Option<Locale>,

        /// Items per commit
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Print the resolved configuration as JSON
    Config,
}

impl Commands {
    pub fn title(&self) -> &'static str {
        match self {
            Commands::Import { .. } => "Full import",
            Commands::Update { .. } => "Value update",
            Commands::Backfill { .. } => "Locale backfill",
            Commands::Config => "Configuration",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Layer command-line flags over the loaded configuration
    pub fn apply_overrides(&self, config: &mut SeederConfig) {
        if let Some(db) = &self.db {
            config.database = Some(db.clone());
        }
        if let Some(workers) = self.workers {
            config.import.workers = workers;
            config.update.workers = workers;
            config.backfill.workers = workers;
        }

        match &self.command {
            Commands::Import { first, last, commit_every, special } => {
                if let Some(first) = first {
                    config.import.first_id = *first;
                }
                if let Some(last) = last {
                    config.import.last_id = *last;
                }
                if let Some(commit_every) = commit_every {
                    config.import.commit_every = *commit_every;
                }
                if let Some(special) = special {
                    config.import.special_ids = special.clone();
                }
            }
            Commands::Update { page_size } => {
                if let Some(page_size) = page_size {
                    config.update.page_size = *page_size;
                }
            }
            Commands::Backfill { locale, marker, page_size } => {
                if let Some(locales) = locale {
                    config.backfill.locales = locales.clone();
                }
                if marker.is_some() {
                    config.backfill.marker = *marker;
                }
                if let Some(page_size) = page_size {
                    config.backfill.page_size = *page_size;
                }
            }
            Commands::Config => {}
        }
    }
}
