use clap::Parser;
use serplot::{ConfigError, PlotterConfig};
use std::io;

pub mod source;

pub use source::{Event, Source};

/// Baud rate used when neither the address nor `--baud` sets one.
pub const DEFAULT_BAUD: u32 = 9600;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid source address '{0}'")]
    InvalidSource(String),
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("cannot send messages to {0}")]
    ReadOnly(String),
}

#[derive(Parser, Debug, Clone)]
pub struct SourceOpts {
    /// Device address (e.g., /dev/ttyACM0, serial://COM3:115200, tcp://localhost:5555, - for stdin)
    #[arg(
        short = 'r',
        long = "root",
        default_value = "-",
        help = "Device address"
    )]
    pub root: String,

    /// Serial baud rate, unless the address carries one
    #[arg(short = 'b', long = "baud", default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// YAML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
}

impl SourceOpts {
    pub fn source(&self) -> Result<Source, ToolError> {
        Source::parse(&self.root, self.baud)
    }

    /// Loads and validates the configuration, or the defaults without `--config`.
    pub fn load_config(&self) -> Result<PlotterConfig, ToolError> {
        let config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    ToolError::ConfigRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                parse_config(&text).map_err(|source| ToolError::ConfigParse {
                    path: path.clone(),
                    source,
                })?
            }
            None => PlotterConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn parse_config(text: &str) -> Result<PlotterConfig, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(PlotterConfig::default());
    }
    serde_yaml::from_str(text)
}

/// Logs to stderr, filtered by `RUST_LOG` or else by `default_level`.
pub fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}
