//! Configuration constants and database settings for the data loader
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application, plus the connection settings assembled from the environment.

use anyhow::Context;
use derive_builder::Builder;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

// ============================================================================
// Dataset Configuration
// ============================================================================

pub const DATASET_URL: &str = "https://downloads.majestic.com/majestic_million.csv";

pub const DATASET_FILE_PATH: &str = "./majestic_million.csv";

/// Destination table created by the schema bootstrap
pub const DEFAULT_TABLE: &str = "domain";

/// Only load this many data rows from the dataset
pub const MAX_RECORDS: u64 = 1_000_000;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// Maximum pooled connections.
///
/// PostgreSQL ships with 100 connections available to regular users (115
/// total, 15 reserved for superusers).
pub const DB_MAX_CONN: u32 = 100;

/// Default worker count.
///
/// Kept below [`DB_MAX_CONN`] so the bootstrap and any admin session still
/// get a connection while every worker holds one.
pub const NUM_WORKERS: usize = 95;

const _: () = assert!((NUM_WORKERS as u32) < DB_MAX_CONN);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled connections are recycled after this long
pub const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(60 * 55);

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Jobs that may sit in the job channel before the dispatcher blocks
pub const JOB_CHANNEL_CAPACITY: usize = 1;

// ============================================================================
// I/O Configuration
// ============================================================================

/// Read buffer for the streaming delimited parser
pub const PARSER_BUFFER_SIZE: usize = 1 << 20; // 1 MiB

/// Environment file read before the command line is parsed
pub const ENV_FILE: &str = ".env";

/// Load `KEY=value` pairs from `path` into the process environment.
///
/// Variables already set win over the file. Returns `Ok(false)` when the
/// file does not exist; a file that cannot be read or parsed is an error.
pub fn load_env_file(path: &std::path::Path) -> anyhow::Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    MySql,
}

impl Driver {
    /// Parse driver from string (case-insensitive)
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mysql" => Ok(Driver::MySql),
            _ => Err(anyhow::anyhow!(
                "Unsupported driver: {}. Supported drivers: postgres, mysql",
                s
            )),
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Driver::Postgres => 5432,
            Driver::MySql => 3306,
        }
    }
}

/// Connection settings, normally sourced from `DB_*` environment variables
#[derive(Debug, Clone, Builder)]
pub struct DatabaseSettings {
    pub driver: Driver,
    #[builder(setter(into))]
    pub host: String,
    #[builder(setter(into, strip_option), default)]
    pub port: Option<u16>,
    #[builder(setter(into))]
    pub username: String,
    #[builder(setter(into), default)]
    pub password: String,
    #[builder(setter(into))]
    pub database: String,
}

impl DatabaseSettings {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    pub fn pg_connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port())
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }

    pub fn mysql_connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port())
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }

    /// Connection string with the password redacted, for logs and console output
    pub fn display_url(&self) -> String {
        let scheme = match self.driver {
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
        };
        format!(
            "{}://{}:***@{}:{}/{}",
            scheme,
            self.username,
            self.host,
            self.port(),
            self.database
        )
    }
}
