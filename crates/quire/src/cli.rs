//! Command-line surface for `quire`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quire_render::{RawConfig, DEFAULT_MAX_AGE};

#[derive(Parser, Debug)]
#[command(name = "quire", version, about = "Render directive templates", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding template sources
    #[arg(long, global = true)]
    pub views: Option<PathBuf>,

    /// Directory for compiled templates
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Public asset directory
    #[arg(long, global = true)]
    pub assets: Option<PathBuf>,

    /// URL prefix for resolved assets
    #[arg(long, global = true)]
    pub assets_url: Option<String>,

    /// Recompile on every render and fail on template errors
    #[arg(long, global = true)]
    pub debug: bool,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Configuration set explicitly on the command line.
    pub fn overrides(&self) -> RawConfig {
        RawConfig {
            views_dir: self.views.clone(),
            cache_dir: self.cache.clone(),
            assets_dir: self.assets.clone(),
            assets_url: self.assets_url.clone(),
            template_extension: None,
            debug: self.debug.then_some(true),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a template or page to stdout or a file
    Render(RenderArgs),
    /// Compile templates into the cache (all templates when none are named)
    Compile {
        templates: Vec<String>,
    },
    /// Compiled template cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template name relative to the views directory
    pub template: String,

    /// JSON or YAML file with the template data
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Render as a page through its layout chain
    #[arg(long)]
    pub page: bool,

    /// Partial as ID=TEMPLATE; repeatable
    #[arg(long = "partial", value_parser = parse_partial)]
    pub partials: Vec<(String, String)>,

    /// Write output here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every compiled template
    Clear,
    /// Remove compiled templates older than --max-age
    Prune {
        /// Maximum age in seconds
        #[arg(long, default_value_t = DEFAULT_MAX_AGE.as_secs())]
        max_age: u64,
    },
}

fn parse_partial(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, template)) if !id.is_empty() && !template.is_empty() => {
            Ok((id.to_string(), template.to_string()))
        }
        _ => Err(format!("expected ID=TEMPLATE, got `{raw}`")),
    }
}
