use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::Level;

use di_registry::config::ConfigLoader;
use di_registry::logging::{init_logging, LogFormat, LoggingConfig};
use di_registry::{deps, implements, Identifier, Registry};

/// Wire a small service graph and show how it resolves
#[derive(Parser, Debug)]
#[command(name = "di-registry-demo")]
#[command(about = "Demonstrates layered registries and override scopes")]
struct Args {
    /// Registry config file (TOML)
    #[arg(long)]
    config: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log output format
    #[arg(long, value_enum, default_value_t = Format::Compact)]
    format: Format,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Compact,
}

trait Logger: Send + Sync {
    fn log(&self, message: &str) -> String;
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, message: &str) -> String {
        format!("[console] {}", message)
    }
}

implements!(ConsoleLogger => dyn Logger);

struct Reporter {
    logger: Arc<dyn Logger>,
    endpoint: Arc<String>,
}

impl Reporter {
    fn new(logger: Arc<dyn Logger>, endpoint: Arc<String>) -> Self {
        Self { logger, endpoint }
    }

    fn report(&self) -> String {
        self.logger.log(&format!("reporting to {}", self.endpoint))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let format = match args.format {
        Format::Pretty => LogFormat::Pretty,
        Format::Compact => LogFormat::Compact,
    };
    init_logging(LoggingConfig::default().with_level(args.log_level).with_format(format))
        .map_err(|e| anyhow::anyhow!("initializing logging: {}", e))?;

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("loading registry config")?;

    let root = Registry::with_config(config);
    let url = Identifier::<String>::token("URL");
    let logger = Identifier::<dyn Logger>::token("Logger");
    let console = Identifier::service(|| ConsoleLogger);
    let reporter = Identifier::service(Reporter::new);
    let audited = Identifier::service_named("AuditReporter", Reporter::new);

    root.register_constant(&url, "http://a/".to_string())?;
    root.register_interface(&logger, &console, deps![])?;
    root.register_service(&reporter, deps![logger, url])?;
    root.register_service_with(&audited, deps![logger, url], |scope| {
        scope.register_constant(&url, "http://audit/".to_string())
    })?;

    let staging = Registry::named("staging");
    staging.add_parent(&root);
    staging.register_constant(&url, "http://b/".to_string())?;

    let plain = Registry::named("plain");
    plain.add_parent(&root);

    println!("root    URL      = {}", root.resolve(&url)?);
    println!("staging URL      = {}", staging.resolve(&url)?);
    println!("plain   URL      = {}", plain.resolve(&url)?);
    println!("root    Reporter : {}", root.resolve(&reporter)?.report());
    println!("root    Audit    : {}", root.resolve(&audited)?.report());
    println!("staging Reporter : {}", staging.resolve(&reporter)?.report());
    println!();
    println!("root stats:    {}", root.stats().summary());
    println!("staging stats: {}", staging.stats().summary());

    Ok(())
}
