//! modelmux - Cost-aware routing gateway for OpenAI-compatible chat completions
//!
//! A local gateway that serves each request from a free model when one is
//! configured, and otherwise from the cheapest paid one.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelmux::backend::BackendRegistry;
use modelmux::config::{Config, KeySource};
use modelmux::router::is_zero_cost;

#[derive(Parser)]
#[command(name = "modelmux")]
#[command(about = "Cost-aware routing gateway for OpenAI-compatible chat completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Show configured providers, models and pricing
    Providers {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn init_tracing(level: &str) {
    let default_filter = format!("modelmux={level},tower_http={level}");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn report_key_sources(key_sources: &[(String, KeySource)]) {
    for (provider, source) in key_sources {
        match source {
            KeySource::None => {
                tracing::warn!(provider = %provider, "No API key configured")
            }
            source => tracing::info!(provider = %provider, key_source = %source, "API key loaded"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut loaded, key_sources) = Config::from_file_with_env(&config)?;
            init_tracing(&loaded.logging.level);

            tracing::info!(config = %config.display(), "Loaded configuration");
            report_key_sources(&key_sources);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                loaded.server.listen = addr;
            }

            modelmux::proxy::run_server(loaded, Some(config)).await
        }

        Commands::Check { config } => {
            let (loaded, key_sources) = Config::from_file_with_env(&config)?;
            let registry = BackendRegistry::with_defaults(&loaded.execution);

            println!("{}: OK", config.display());
            println!("  listen: {}", loaded.server.listen);
            match loaded.execution.request_timeout() {
                Some(timeout) => println!("  request timeout: {:?}", timeout),
                None => println!("  request timeout: none"),
            }

            let mut unsupported = 0;
            for (provider, (_, source)) in loaded.providers.iter().zip(&key_sources) {
                let status = if registry.supports(&provider.provider_type) {
                    "ok"
                } else {
                    unsupported += 1;
                    "UNSUPPORTED TYPE"
                };
                println!(
                    "  provider {} (type {}): {}, {} model(s), key: {}",
                    provider.id,
                    provider.provider_type,
                    status,
                    provider.models.len(),
                    source
                );
            }

            if unsupported > 0 {
                anyhow::bail!(
                    "{} provider(s) use an unsupported type (supported: {})",
                    unsupported,
                    registry.supported_types().join(", ")
                );
            }
            Ok(())
        }

        Commands::Providers { config } => {
            let (loaded, _) = Config::from_file_with_env(&config)?;

            for provider in &loaded.providers {
                println!("{} ({})", provider.id, provider.provider_type);
                if let Some(url) = &provider.base_url {
                    println!("  base_url: {}", url);
                }
                for model in &provider.models {
                    let price = match &model.pricing {
                        Some(p) => format!(
                            "in {} / out {} per 1M tokens, {} per request",
                            fmt_price(p.input_cost_per_million_tokens),
                            fmt_price(p.output_cost_per_million_tokens),
                            fmt_price(p.cost_per_request),
                        ),
                        None => "no pricing".to_string(),
                    };
                    let tag = if is_zero_cost(model.pricing.as_ref()) {
                        " [free]"
                    } else {
                        ""
                    };
                    println!(
                        "  {} -> {}: {}{}",
                        model.exposed_id(),
                        model.canonical_slug,
                        price,
                        tag
                    );
                }
            }
            Ok(())
        }
    }
}

fn fmt_price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${}", v),
        None => "?".to_string(),
    }
}
