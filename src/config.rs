use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Engine configuration, passed explicitly into the store and service.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub table_prefix: String,
    /// Lets a record whose head request was rejected be submitted again. The
    /// new request supersedes the rejected one. Off unless asked for.
    pub resubmit_after_rejection: bool,
}

/// Tree names for the four moderation tables, plus the namespace that
/// target-record trees are created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub requests: String,
    pub steps: String,
    pub step_users: String,
    pub record_links: String,
    pub records: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            db_path: env::var("MODERATION_DB_PATH")
                .unwrap_or_else(|_| "moderation.db".to_string())
                .into(),
            table_prefix: env::var("MODERATION_TABLE_PREFIX")
                .unwrap_or_else(|_| "mod_".to_string()),
            resubmit_after_rejection: env::var("MODERATION_RESUBMIT_AFTER_REJECTION")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("MODERATION_RESUBMIT_AFTER_REJECTION must be true or false")?,
        })
    }

    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn table_names(&self) -> TableNames {
        TableNames::with_prefix(&self.table_prefix)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("moderation.db"),
            table_prefix: "mod_".to_string(),
            resubmit_after_rejection: false,
        }
    }
}

impl TableNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            requests: format!("{prefix}requests"),
            steps: format!("{prefix}steps"),
            step_users: format!("{prefix}step_users"),
            record_links: format!("{prefix}record_links"),
            records: format!("{prefix}rec:"),
        }
    }

    /// Tree holding the target records of `table`. The `rec:` segment keeps
    /// it apart from the moderation trees whatever the table is called.
    pub fn record_tree(&self, table: &str) -> String {
        format!("{}{table}", self.records)
    }
}
