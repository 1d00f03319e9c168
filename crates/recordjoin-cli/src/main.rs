//! recordjoin CLI
//!
//! Loads a JSON datasource configuration, searches the main source and
//! shows or selects the entries of the local override cache.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ListCommand, RefreshCommand, SearchCommand, SelectCommand, ShowCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "RECORDJOIN_LOG_LEVEL",
        global = true
    )]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "RECORDJOIN_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Free-text search in the main source, results are added to the cache
    Search(SearchCommand),
    /// Show the values of the selected entry
    Show(ShowCommand),
    /// List the cached entries
    List(ListCommand),
    /// Select a cached entry by its position in the list
    Select(SelectCommand),
    /// Look up every cached entry again
    Refresh(RefreshCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "recordjoin={level},\
             recordjoin_query={level},\
             recordjoin_query_ldap={level},\
             recordjoin_query_officedb={level},\
             recordjoin_los={level},\
             recordjoin_joiner={level}",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    match cli.command {
        Commands::Search(cmd) => cmd.execute(),
        Commands::Show(cmd) => cmd.execute(),
        Commands::List(cmd) => cmd.execute(),
        Commands::Select(cmd) => cmd.execute(),
        Commands::Refresh(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "recordjoin",
            "--log-level",
            "debug",
            "search",
            "--config",
            "sources.json",
            "Sheldon",
            "Coop.",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Search(cmd) => {
                assert_eq!(cmd.text, vec!["Sheldon", "Coop."]);
                assert!(cmd.source.cache.is_none());
            }
            _ => panic!("expected search"),
        }

        assert!(Cli::try_parse_from(["recordjoin", "search", "--config", "x.json"]).is_err());
    }
}
