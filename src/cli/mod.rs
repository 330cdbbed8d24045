//! CLI for the semantic query cache
//!
//! Subcommands operate on the configured cache file:
//! - `get` / `put` / `remove`: single-query access
//! - `stats`: entry count, file size and threshold
//! - `optimize`: evict least recently used entries
//! - `export`: JSON dump for debugging
//! - `clear`: drop everything, including the file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::semantic_cache::CacheEngine;
use crate::infrastructure::services::QueryCacheService;

/// Semantic query cache - reuse results of similar queries
#[derive(Parser)]
#[command(name = "semcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Cache file (overrides configuration and SEMANTIC_CACHE_FILE)
    #[arg(long, global = true)]
    pub cache_file: Option<PathBuf>,

    /// Similarity threshold between 0 and 1
    #[arg(long, global = true)]
    pub threshold: Option<f32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the cached result for a query
    Get { query: String },

    /// Cache a result for a query and save
    Put { query: String, result: String },

    /// Remove a query from the cache and save
    Remove { query: String },

    /// Show cache statistics as JSON
    Stats,

    /// Evict least recently used entries and save
    Optimize {
        /// Entries to keep; defaults to the configured capacity
        #[arg(long)]
        max_entries: Option<usize>,
    },

    /// Export all entries as JSON
    Export { path: PathBuf },

    /// Remove all entries and delete the cache file
    Clear,
}

/// Run a parsed command against the configured cache
pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    let mut cache_config = config.cache.clone();

    if let Some(path) = cli.cache_file {
        cache_config.cache_file = Some(path);
    }
    if let Some(threshold) = cli.threshold {
        cache_config.similarity_threshold = threshold;
    }

    let engine = CacheEngine::new(cache_config).context("Failed to open semantic cache")?;
    let service = QueryCacheService::new(Arc::new(engine));

    match cli.command {
        Command::Get { query } => match service.get(&query).await? {
            Some(result) => println!("{}", result),
            None => println!("(miss)"),
        },
        Command::Put { query, result } => {
            service.put(&query, result).await?;
            service.save().await.context("Failed to save semantic cache")?;
        }
        Command::Remove { query } => {
            if service.remove(&query).await? {
                service.save().await.context("Failed to save semantic cache")?;
            } else {
                println!("(not cached)");
            }
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Optimize { max_entries } => {
            let evicted = service.optimize(max_entries).await?;
            service.save().await.context("Failed to save semantic cache")?;
            println!("evicted {} entries", evicted);
        }
        Command::Export { path } => {
            service
                .export_json(&path)
                .await
                .with_context(|| format!("Failed to export cache to {}", path.display()))?;
            println!("exported to {}", path.display());
        }
        Command::Clear => {
            service.invalidate_all().await?;
            println!("cache cleared");
        }
    }

    Ok(())
}
