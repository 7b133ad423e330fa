//! Inspect a BREAD site file from the command line.
//!
//! Loads the site (models, breads, seed records), validates every bread and
//! answers questions about URLs, ordering and search without a server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bread::browse::{order_for, search_plan};
use bread::core::record::Record;
use bread::exit_codes;
use bread::io::config::DEFAULT_CONFIG_PATH;
use bread::scaffold::Bread;
use bread::site::Site;
use bread::store::QuerySet;
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser)]
#[command(name = "bread", version, about = "Validate and query BREAD site configurations")]
struct Cli {
    /// Site file to load.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the site and validate every bread against the schema.
    Check,
    /// List the URL patterns of every bread.
    Urls {
        /// Omit the `{plural}/` prefix from routes.
        #[arg(long)]
        no_prefix: bool,
    },
    /// Print the sort keys an `o` parameter compiles to.
    Order {
        /// Plural name of the bread.
        #[arg(long)]
        bread: String,
        #[arg(short = 'o', long = "order", default_value = "", allow_hyphen_values = true)]
        order: String,
    },
    /// Print the records a search query matches, in default order.
    Search {
        #[arg(long)]
        bread: String,
        #[arg(short = 'q', long = "query")]
        query: String,
    },
}

fn main() {
    bread::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let site = Site::load(&cli.config)?;
    match cli.command {
        Command::Check => cmd_check(&site),
        Command::Urls { no_prefix } => cmd_urls(&site, !no_prefix),
        Command::Order { bread, order } => cmd_order(&site, &bread, &order),
        Command::Search { bread, query } => cmd_search(&site, &bread, &query),
    }
}

fn find_bread<'s>(site: &'s Site, plural_name: &str) -> Result<&'s Bread> {
    site.bread(plural_name)
        .with_context(|| format!("no bread with plural name '{plural_name}'"))
}

fn cmd_check(site: &Site) -> Result<i32> {
    for bread in &site.breads {
        println!(
            "{}\t{}\tviews={}\tsortable={:?}",
            bread.plural_name(),
            bread.model(),
            bread.views(),
            bread.sortable().indices()
        );
    }
    println!(
        "ok: {} models, {} breads",
        site.schema.models().count(),
        site.breads.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_urls(site: &Site, prefix: bool) -> Result<i32> {
    for pattern in site.url_patterns(prefix)? {
        println!("{}\t{}\t{}", pattern.name, pattern.route, pattern.regex());
    }
    Ok(exit_codes::OK)
}

fn cmd_order(site: &Site, plural_name: &str, order: &str) -> Result<i32> {
    let bread = find_bread(site, plural_name)?;
    match order_for(bread, &site.store, order) {
        Ok(keys) => {
            for key in keys {
                println!("{key}");
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::BAD_REQUEST)
        }
    }
}

fn cmd_search(site: &Site, plural_name: &str, query: &str) -> Result<i32> {
    let bread = find_bread(site, plural_name)?;
    let plan = search_plan(bread, query);
    debug!(distinct = plan.distinct, "search plan");
    let order = order_for(bread, &site.store, "")?;
    let records = site.store.execute(&QuerySet {
        model: bread.model().to_string(),
        search: plan.predicate,
        distinct: plan.distinct,
        order,
    })?;
    for record in records {
        println!("{}\t{}", record.id(), record.display()?);
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_config_path() {
        let cli = Cli::parse_from(["bread", "check"]);
        assert_eq!(cli.config, PathBuf::from("bread.toml"));
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn parse_order_and_search() {
        let cli = Cli::parse_from(["bread", "order", "--bread", "testmodels", "-o", "-1,0"]);
        assert!(matches!(
            cli.command,
            Command::Order { ref bread, ref order } if bread == "testmodels" && order == "-1,0"
        ));
        let cli = Cli::parse_from(["bread", "--config", "x.toml", "search", "--bread", "t", "-q", "a b"]);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Command::Search { ref query, .. } if query == "a b"));
    }

    #[test]
    fn parse_urls_flag() {
        let cli = Cli::parse_from(["bread", "urls", "--no-prefix"]);
        assert!(matches!(cli.command, Command::Urls { no_prefix: true }));
    }
}
