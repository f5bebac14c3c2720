use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

/// Command-line arguments for the glossa binary.
#[derive(Debug, Parser)]
#[command(name = "glossa", version, about = "Label and description resolver")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GLOSSA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP peer surface.
    Serve(Box<ServeArgs>),
    /// Resolve labels, descriptions or types once and print them as JSON.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the dataset file loaded into the in-memory store.
    #[arg(long = "dataset", value_name = "PATH")]
    pub dataset: Option<PathBuf>,

    /// Override the default preferred languages (comma separated).
    #[arg(long = "languages", value_name = "TAGS", value_delimiter = ',')]
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Toggle caching of resolved values.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResolveKind {
    #[default]
    Label,
    Description,
    Type,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Repository to resolve against; defaults to `data.default_repository`.
    #[arg(long = "repository", value_name = "NAME")]
    pub repository: Option<String>,

    /// What to resolve.
    #[arg(long = "kind", value_enum, default_value_t = ResolveKind::Label)]
    pub kind: ResolveKind,

    /// Preferred language placed ahead of the configured defaults.
    #[arg(long = "language", value_name = "TAG")]
    pub language: Option<String>,

    /// Resource identifiers.
    #[arg(value_name = "ID", required = true, num_args = 1..)]
    pub ids: Vec<String>,
}
