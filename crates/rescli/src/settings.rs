use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rescache_service::config::Config;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs every outcome as a JSON object.
    Json,
    /// Outputs the outcomes as a table.
    Compact,
}

/// A utility that resolves keys through rescache resource caches.
///
/// Every resource is a directory; resolving a key reads the file of that name in the directory.
#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Resolve keys of the configured resources.
    Resolve(ResolveArgs),
}

#[derive(Clone, Args, Debug)]
pub struct ResolveArgs {
    /// Path to the YAML configuration file listing the resources.
    #[arg(long, short)]
    pub config: PathBuf,

    /// The keys to resolve, in the form `<resource>/<key>`.
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// The output format.
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// The severity level of logging output.
    ///
    /// Overrides the level of the configuration file. Possible values:
    /// off, error, warn, info, debug, trace
    #[arg(long)]
    pub log_level: Option<LevelFilter>,
}

/// A resource backed by a directory.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// The cache namespace.
    pub name: String,
    /// The directory containing one file per key.
    pub root: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(flatten)]
    service: Config,
    #[serde(default)]
    resources: Vec<ResourceConfig>,
}

impl ConfigFile {
    fn parse(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path).with_context(|| {
            format!("Could not read configuration file at {}", path.display())
        })?;
        Self::from_yaml(&buf)
    }

    fn from_yaml(buf: &str) -> Result<Self> {
        if buf.trim().is_empty() {
            bail!("config file empty");
        }
        serde_yaml::from_str(buf).context("Could not parse configuration file")
    }
}

/// A key to resolve, as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRequest {
    pub resource: String,
    pub key: String,
}

impl KeyRequest {
    pub fn parse(arg: &str) -> Result<Self> {
        match arg.split_once('/') {
            Some((resource, key)) if !resource.is_empty() && !key.is_empty() => Ok(Self {
                resource: resource.to_owned(),
                key: key.to_owned(),
            }),
            _ => bail!("Invalid key `{arg}`, expected `<resource>/<key>`"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub config: Config,
    pub resources: Vec<ResourceConfig>,
    pub keys: Vec<KeyRequest>,
    pub output_format: OutputFormat,
}

impl Settings {
    pub fn from_args(args: ResolveArgs) -> Result<Self> {
        let file = ConfigFile::parse(&args.config)?;
        Self::from_parts(file, args)
    }

    fn from_parts(file: ConfigFile, args: ResolveArgs) -> Result<Self> {
        let ConfigFile {
            service: mut config,
            resources,
        } = file;

        let mut names = HashSet::new();
        for resource in &resources {
            if !names.insert(resource.name.as_str()) {
                bail!("Duplicate resource `{}`", resource.name);
            }
        }

        if let Some(level) = args.log_level {
            config.logging.level = level;
        }

        let keys = args
            .keys
            .iter()
            .map(|arg| KeyRequest::parse(arg))
            .collect::<Result<Vec<_>>>()?;

        for request in &keys {
            if !resources.iter().any(|r| r.name == request.resource) {
                bail!("Unknown resource `{}`", request.resource);
            }
        }

        Ok(Self {
            config,
            resources,
            keys,
            output_format: args.format,
        })
    }
}
