//! treefetch - fetch source trees by reference
//!
//! Usage:
//!   treefetch parse github:NixOS/nixpkgs/nixos-21.05
//!   treefetch fetch github:NixOS/nixpkgs/nixos-21.05 [--nar-hash sha256-...] [--json]
//!   treefetch clone github:NixOS/nix ./nix

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treefetch_core::attrs::Attrs;
use treefetch_core::config::Settings;
use treefetch_core::context::FetchContext;
use treefetch_core::hash::Hash;
use treefetch_core::input::Input;
use treefetch_core::registry::InputSchemeRegistry;
use treefetch_core::tree::Tree;

#[derive(Parser)]
#[command(name = "treefetch")]
#[command(about = "Fetch source trees from GitHub and git remotes", long_about = None)]
struct Cli {
    /// Settings file (defaults to <config dir>/treefetch/treefetch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a reference and print its attributes as JSON
    Parse {
        /// Input URL, e.g. github:owner/repo/ref
        url: String,
    },

    /// Fetch a tree into the store
    Fetch {
        /// Input URL, e.g. github:owner/repo/ref
        url: String,

        /// Expected NAR hash (SRI or <algo>:<hex>)
        #[arg(long)]
        nar_hash: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a git working copy of an input
    Clone {
        /// Input URL, e.g. github:owner/repo/ref
        url: String,
        /// Destination directory
        dest: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treefetch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse { url } => run_parse(&url),
        Commands::Fetch {
            url,
            nar_hash,
            json,
        } => run_fetch(settings, &url, nar_hash.as_deref(), json),
        Commands::Clone { url, dest } => run_clone(settings, &url, dest),
    }
}

fn run_parse(url: &str) -> Result<()> {
    let input = InputSchemeRegistry::global().input_from_url(url)?;
    println!("{}", attrs_json(&input.to_attrs())?);
    Ok(())
}

fn run_fetch(settings: Settings, url: &str, nar_hash: Option<&str>, json: bool) -> Result<()> {
    let ctx = FetchContext::from_settings(settings)?;
    let expected = nar_hash
        .map(Hash::parse_any)
        .transpose()
        .context("Invalid --nar-hash")?;

    let input = ctx.input_from_url(url)?.with_nar_hash(expected);
    let (tree, resolved) = input
        .fetch_tree(&ctx)
        .with_context(|| format!("Failed to fetch '{}'", url))?;

    if json {
        let report = fetch_report(&ctx, &tree, &resolved);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_fetch(&ctx, &tree, &resolved);
    }
    Ok(())
}

fn run_clone(settings: Settings, url: &str, dest: PathBuf) -> Result<()> {
    if dest.exists() {
        anyhow::bail!("Destination already exists: {}", dest.display());
    }
    let ctx = FetchContext::from_settings(settings)?;
    let input = ctx.input_from_url(url)?;
    input
        .clone_to(&ctx, &dest)
        .with_context(|| format!("Failed to clone '{}'", url))?;
    println!("Cloned {} into {}", input, dest.display());
    Ok(())
}

fn attrs_json(attrs: &Attrs) -> Result<String> {
    Ok(serde_json::to_string_pretty(attrs)?)
}

fn fetch_report(ctx: &FetchContext, tree: &Tree, resolved: &Input) -> serde_json::Value {
    serde_json::json!({
        "storePath": ctx.store().print_store_path(&tree.store_path),
        "path": tree.actual_path,
        "rev": resolved.get_rev().map(Hash::git_rev),
        "lastModified": tree.info.last_modified,
        "narHash": tree.info.nar_hash.as_ref().map(Hash::to_sri),
        "locked": resolved.to_display_string(),
        "lockedAttrs": resolved.to_attrs(),
    })
}

fn print_fetch(ctx: &FetchContext, tree: &Tree, resolved: &Input) {
    println!("Store path:    {}", ctx.store().print_store_path(&tree.store_path));
    println!("Path:          {}", tree.actual_path.display());
    if let Some(rev) = resolved.get_rev() {
        println!("Revision:      {}", rev.git_rev());
    }
    if let Some(last_modified) = tree.info.last_modified {
        println!("Last modified: {}", last_modified);
    }
    if let Some(nar_hash) = &tree.info.nar_hash {
        println!("NAR hash:      {}", nar_hash.to_sri());
    }
    println!("Locked:        {}", resolved);
}
