//! PowerStore provider
//!
//! Command line entry point. `serve` runs the HTTP host surface; the other
//! subcommands run one lifecycle call, reading a JSON request from a file or
//! stdin and printing the resulting state to stdout.

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use powerstore_provider::api::{ApiErrorResponse, LifecycleRequest};
use powerstore_provider::framework::diagnostics::category_label;
use powerstore_provider::framework::Diagnostics;
use powerstore_provider::{
    ApiServer, ApiServerConfig, ConfigOverrides, Error, PowerStoreProvider, ProviderConfig, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Terraform-style provider for Dell PowerStore arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Use the in-memory array instead of a real PowerStore
    #[arg(long, global = true, env = "POWERSTORE_SIMULATE")]
    simulate: bool,

    /// YAML file with provider settings
    #[arg(long, global = true, env = "POWERSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// REST endpoint, for example https://10.0.0.1/api/rest
    #[arg(long, global = true, env = "POWERSTORE_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, global = true, env = "POWERSTORE_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "POWERSTORE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(
        long,
        global = true,
        env = "POWERSTORE_INSECURE",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    insecure: Option<bool>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "POWERSTORE_TIMEOUT")]
    timeout: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the provider over HTTP
    Serve {
        /// REST API bind address
        #[arg(long, env = "API_ADDR", default_value = "127.0.0.1:8090")]
        api_addr: String,
    },
    /// Print provider, resource and data source schemas
    Schema,
    /// Create a resource from `{"config": ...}`
    Create(Invocation),
    /// Refresh a resource from `{"state": ...}`
    Read(Invocation),
    /// Update a resource from `{"config": ..., "state": ...}`
    Update(Invocation),
    /// Delete a resource from `{"state": ...}`
    Delete(Invocation),
    /// Import an existing entity by id
    Import {
        /// Resource type, with or without the powerstore_ prefix
        type_name: String,
        id: String,
    },
    /// Read a data source from `{"config": ...}`
    ReadData(Invocation),
}

#[derive(clap::Args, Debug)]
struct Invocation {
    /// Resource or data source type, with or without the powerstore_ prefix
    type_name: String,

    /// JSON request file; stdin when omitted
    #[arg(long, short)]
    input: Option<PathBuf>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}: {}", err.summary(), err.detail());
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if let Command::Schema = args.command {
        // Schemas do not need an array connection
        let provider = PowerStoreProvider::simulated();
        return print_json(&provider.schema()?);
    }

    let provider = Arc::new(connect(&args).await?);

    match args.command {
        Command::Serve { api_addr } => serve(provider, &api_addr).await,
        Command::Schema => Ok(()),
        Command::Create(invocation) => {
            let request = read_request(&invocation)?;
            let handler = provider.resource(&invocation.type_name)?;
            let config = required(request.config, "config")?;
            print_json(&handler.create(&config).await?)
        }
        Command::Read(invocation) => {
            let request = read_request(&invocation)?;
            let handler = provider.resource(&invocation.type_name)?;
            let state = required(request.state, "state")?;
            print_json(&handler.read(&state).await?)
        }
        Command::Update(invocation) => {
            let request = read_request(&invocation)?;
            let handler = provider.resource(&invocation.type_name)?;
            let config = required(request.config, "config")?;
            let state = required(request.state, "state")?;
            print_json(&handler.update(&config, &state).await?)
        }
        Command::Delete(invocation) => {
            let request = read_request(&invocation)?;
            let handler = provider.resource(&invocation.type_name)?;
            let state = required(request.state, "state")?;
            handler.delete(&state).await?;
            info!("Deleted {}", invocation.type_name);
            Ok(())
        }
        Command::Import { type_name, id } => {
            let handler = provider.resource(&type_name)?;
            print_json(&handler.import(&id).await?)
        }
        Command::ReadData(invocation) => {
            let request = read_request(&invocation)?;
            let handler = provider.data_source(&invocation.type_name)?;
            let config = required(request.config, "config")?;
            print_json(&handler.read(&config).await?)
        }
    }
}

async fn connect(args: &Args) -> Result<PowerStoreProvider> {
    if args.simulate {
        return Ok(PowerStoreProvider::simulated());
    }

    let file = args
        .config
        .as_ref()
        .map(ProviderConfig::from_yaml_file)
        .transpose()?;
    let overrides = ConfigOverrides {
        endpoint: args.endpoint.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        insecure: args.insecure,
        timeout: args.timeout,
    };
    let config = ProviderConfig::resolve(file, overrides)?;
    info!("Provider config: {:?}", config);

    PowerStoreProvider::configure(&config).await
}

async fn serve(provider: Arc<PowerStoreProvider>, api_addr: &str) -> Result<()> {
    let config = ApiServerConfig {
        rest_addr: api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid REST API address: {}", e)))?,
    };

    info!("Starting PowerStore provider");
    info!("  Version: {}", powerstore_provider::VERSION);

    let server = Arc::new(ApiServer::new(config, provider)?);
    {
        let server = server.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                server.shutdown();
            }
        });
    }

    server.run().await?;
    info!("Provider shutdown complete");
    Ok(())
}

// =============================================================================
// Input/Output
// =============================================================================

fn read_request(invocation: &Invocation) -> Result<LifecycleRequest> {
    let raw = match &invocation.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| {
        Error::validation(
            "Invalid Request",
            format!("request document must contain \"{}\"", field),
        )
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Failure body on stderr, same shape as the HTTP error response
fn report(err: &Error) {
    let body = ApiErrorResponse {
        error: category_label(err),
        summary: err.summary(),
        detail: err.detail(),
        diagnostics: Diagnostics::from_error(err),
    };
    match serde_json::to_string_pretty(&body) {
        Ok(rendered) => eprintln!("{}", rendered),
        Err(_) => eprintln!("{}", err),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "tower=warn", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries command output, logs go to stderr
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
