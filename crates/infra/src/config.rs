//! Runtime configuration read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::read_model::page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const STORE_VAR: &str = "EXPORTMART_STORE";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const SEED_FILE_VAR: &str = "EXPORTMART_SEED_FILE";
pub const PAGE_SIZE_VAR: &str = "EXPORTMART_PAGE_SIZE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is required when {requires}")]
    Missing { key: &'static str, requires: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which backend holds events and read models.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreKind::Memory),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            other => Err(format!("expected 'memory' or 'postgres', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub default_page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            database_url: None,
            seed_file: None,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store = match get(STORE_VAR) {
            Some(raw) => raw.parse::<StoreKind>().map_err(|reason| ConfigError::Invalid {
                key: STORE_VAR,
                value: raw.clone(),
                reason,
            })?,
            None => StoreKind::default(),
        };

        let database_url = get(DATABASE_URL_VAR);
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing {
                key: DATABASE_URL_VAR,
                requires: format!("{STORE_VAR}=postgres"),
            });
        }

        let default_page_size = match get(PAGE_SIZE_VAR) {
            Some(raw) => parse_page_size(&raw)?,
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            store,
            database_url,
            seed_file: get(SEED_FILE_VAR).map(PathBuf::from),
            default_page_size,
        })
    }
}

fn parse_page_size(raw: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: PAGE_SIZE_VAR,
        value: raw.to_string(),
        reason,
    };
    let size: u32 = raw.trim().parse().map_err(|e| invalid(format!("{e}")))?;
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(invalid(format!("must be between 1 and {MAX_PAGE_SIZE}")));
    }
    Ok(size)
}
