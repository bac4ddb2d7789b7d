//! Configuration module for Tidepool
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use tidepool::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tidepool.toml")).unwrap();
//! println!("Storage folder: {}", config.crawler.storage_folder);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, RobotsConfig, SeedEntry, SeenUrlEntry, SessionConfig,
    UserAgentConfig, MAX_ROBOTS_CACHE_HOURS,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
