use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::{RegisterCatalogParser, DEFAULT_REGISTER_BASE};
use crate::output::OutputFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GenConfig register map export.
    pub export_file: PathBuf,
    /// TOML register snapshot answering reads offline.
    pub snapshot_file: Option<PathBuf>,
    pub parser: ParserConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Reference mapped to protocol address 0.
    pub register_base: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
    pub include_raw: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_file: PathBuf::from("./data/regmap.txt"),
            snapshot_file: None,
            parser: ParserConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            register_base: DEFAULT_REGISTER_BASE,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Console.to_string(),
            include_raw: false,
        }
    }
}

impl Config {
    /// Config file named by `--config` (or defaults), then command line
    /// overrides on top.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(export) = matches.get_one::<String>("export") {
            config.export_file = PathBuf::from(export);
        }
        if let Some(snapshot) = matches.get_one::<String>("snapshot") {
            config.snapshot_file = Some(PathBuf::from(snapshot));
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output.default_format = format.clone();
        }
        if let Some(base) = matches.get_one::<String>("register-base") {
            config.parser.register_base = base
                .parse()
                .with_context(|| format!("invalid register base '{}'", base))?;
        }
        if matches.get_flag("raw") {
            config.output.include_raw = true;
        }

        config.output_format()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        info!("⚙️  Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.output
            .default_format
            .parse()
            .map_err(|e: String| anyhow!(e))
    }

    pub fn parser(&self) -> RegisterCatalogParser {
        RegisterCatalogParser::with_register_base(self.parser.register_base)
    }
}
