use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachehelper::{CacheConfig, CacheHandle, CacheHelper, CacheKind};

/// cachehelper - Talk to the in-process store, Memcached or Redis through one API
///
/// Backends are configured through environment variables
/// (`CACHE_BACKEND`, `REDIS_CONNECTION_STRING`, `MEMCACHED_IP`, ...).
#[derive(Parser, Debug)]
#[command(name = "cachehelper")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Backend for this command (inprocess, memcached, redis). Defaults to CACHE_BACKEND.
    #[arg(long, short, global = true)]
    backend: Option<CacheKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Expire after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Print a value
    Get { key: String },
    /// Remove a key
    Delete { key: String },
    /// Report whether a key exists
    Exists { key: String },
    /// Reset the expiry of a key
    Expire { key: String, seconds: u64 },
    /// Increment a counter
    Incr {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
    },
    /// Decrement a counter
    Decr {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
    },
    /// Append to a list
    Push { key: String, value: String },
    /// Pop the last element of a list
    Pop { key: String },
    /// Print a whole list
    Range { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachehelper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CacheConfig::from_env()?;
    let helper = CacheHelper::new(config)?;
    let cache = helper.on(cli.backend);

    tracing::debug!(backend = %cache.kind(), "Running command");
    run(&cache, cli.command).await
}

async fn run(cache: &CacheHandle, command: Command) -> Result<()> {
    match command {
        Command::Set { key, value, ttl } => {
            let stored = cache
                .set(&key, value.as_str(), ttl.map(Duration::from_secs))
                .await?;
            println!("{}", if stored { "OK" } else { "NOT STORED" });
        }
        Command::Get { key } => match cache.get_string(&key).await? {
            Some(value) => println!("{value}"),
            None => println!("(nil)"),
        },
        Command::Delete { key } => println!("{}", cache.delete(&key).await?),
        Command::Exists { key } => println!("{}", cache.exists(&key).await?),
        Command::Expire { key, seconds } => println!(
            "{}",
            cache
                .update_expiry(&key, Duration::from_secs(seconds))
                .await?
        ),
        Command::Incr { key, by } => println!("{}", cache.increase(&key, by).await?),
        Command::Decr { key, by } => println!("{}", cache.decrease(&key, by).await?),
        Command::Push { key, value } => {
            println!("{}", cache.list_right_push(&key, value.as_str()).await?)
        }
        Command::Pop { key } => match cache.list_right_pop_string(&key).await? {
            Some(value) => println!("{value}"),
            None => println!("(nil)"),
        },
        Command::Range { key } => {
            for (index, value) in cache.list_range_string(&key).await?.iter().enumerate() {
                println!("{}) {value}", index + 1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_backend_and_command() {
        let cli = Cli::parse_from(["cachehelper", "--backend", "redis", "incr", "hits", "--by", "5"]);

        assert_eq!(cli.backend, Some(CacheKind::Redis));
        assert!(matches!(cli.command, Command::Incr { ref key, by: 5 } if key == "hits"));
    }

    #[test]
    fn test_cli_backend_is_optional() {
        let cli = Cli::parse_from(["cachehelper", "set", "k", "v", "--ttl", "30"]);

        assert_eq!(cli.backend, None);
        assert!(matches!(cli.command, Command::Set { ttl: Some(30), .. }));
    }

    #[test]
    fn test_cli_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["cachehelper", "--backend", "disk", "get", "k"]).is_err());
    }

    #[tokio::test]
    async fn test_run_against_in_process() {
        let helper = CacheHelper::new(CacheConfig::default()).unwrap();
        let cache = helper.cache();

        run(
            &cache,
            Command::Set {
                key: "k".to_string(),
                value: "v".to_string(),
                ttl: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(cache.get_string("k").await.unwrap(), Some("v".to_string()));

        // Counters are not available on the in-process store
        let err = run(
            &cache,
            Command::Incr {
                key: "n".to_string(),
                by: 1,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not support increase"));
    }
}
