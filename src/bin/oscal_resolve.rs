use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use oscal_kernel_rs::{Config, DocumentKind, Loader, Logger};
use serde_json::json;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "oscal-resolve")]
#[command(about = "Load an OSCAL document and resolve the controls it inherits")]
struct CliOptions {
    /// Document URL or local path (defaults to the kind's demo document)
    source: Option<String>,

    /// Document kind: catalog, component, profile or ssp
    #[arg(long = "kind", short = 'k', default_value = "ssp")]
    kind: DocumentKind,

    /// TOML configuration file
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Override the REST backend base URL
    #[arg(long = "rest-base-url")]
    rest_base_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error, fatal)
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the loaded document with the resolution attached instead of
    /// the resolution alone
    #[arg(long = "attach", action = ArgAction::SetTrue)]
    attach: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = CliOptions::parse();

    let mut config = Config::load(opts.config.as_deref())?;
    if let Some(url) = opts.rest_base_url {
        config.rest_base_url = url;
    }
    if let Some(level) = opts.log_level {
        config.log_level = level;
    }
    // stdout carries the resolution only.
    let logger = Logger::new(config.level()?)
        .stderr_only()
        .with_tags(json!({ "bin": "oscal-resolve" }));

    let source = match opts.source {
        Some(source) => document_url(&source)?,
        None => opts.kind.default_url().to_string(),
    };

    let loader = Loader::from_config(&config, logger.clone());
    let loaded = loader
        .load(opts.kind, &source)
        .with_context(|| format!("Unable to load {} from {source}", opts.kind))?;
    let resolution = loader
        .resolve(&loaded)
        .with_context(|| format!("Unable to resolve imports of {source}"))?;
    logger.info(
        "resolution complete",
        Some(json!({
            "url": source,
            "controls": resolution.resolved_controls.len(),
            "sources": resolution.inherited.len(),
        })),
    );

    let output = if opts.attach {
        let mut document = loaded.document;
        let root = document
            .get_mut(opts.kind.json_root_name())
            .context("Loaded document lost its root key")?;
        resolution.attach_to(root)?;
        document
    } else {
        serde_json::to_value(&resolution)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Relative paths become `file://` URLs so relative import hrefs inside the
/// document resolve against its directory.
fn document_url(source: &str) -> Result<String> {
    if Url::parse(source).map_or(false, |url| url.scheme().len() > 1) {
        return Ok(source.to_string());
    }
    let path = Path::new(source);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Unable to read current directory")?
            .join(path)
    };
    let absolute = absolute.canonicalize().unwrap_or(absolute);
    Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .map_err(|_| anyhow::anyhow!("Unable to turn {} into a file URL", absolute.display()))
}
