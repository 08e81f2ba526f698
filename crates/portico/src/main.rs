//! The reference Portico server.

use std::path::PathBuf;

use anyhow::Context as _;
use portico::config::ConfigLoader;
use portico::App;

/// Environment prefix for every setting, e.g. `PORTICO_PORT`.
const ENV_PREFIX: &str = "PORTICO";

struct Args {
    config: Option<PathBuf>,
    env_file: PathBuf,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut args = std::env::args().skip(1);
        let mut parsed = Self {
            config: None,
            env_file: PathBuf::from(".env"),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--env-file" => {
                    let path = args.next().context("--env-file needs a path")?;
                    parsed.env_file = PathBuf::from(path);
                }
                "--help" | "-h" => {
                    print_help();
                    return Ok(None);
                }
                "--version" | "-V" => {
                    println!("portico {}", env!("CARGO_PKG_VERSION"));
                    return Ok(None);
                }
                other => anyhow::bail!("unknown argument '{other}', see --help"),
            }
        }
        Ok(Some(parsed))
    }
}

const HELP: &str = r"Portico reference server

USAGE:
    portico [OPTIONS]

OPTIONS:
    -c, --config <PATH>     TOML or JSON configuration file
        --env-file <PATH>   .env file to read if present (default: .env)
    -h, --help              Print help information
    -V, --version           Print version information

ENVIRONMENT VARIABLES:
    PORTICO_HOST                    Listen address (default: 0.0.0.0)
    PORTICO_PORT                    Listen port (default: 8080)
    PORTICO_MAX_BODY_BYTES          Largest JSON body (default: 1048576)
    PORTICO_RATE_LIMIT_RPS          Requests per second per client (default: 50)
    PORTICO_CORS_ORIGIN             Allowed origin (default: *)
    PORTICO_REQUEST_TIMEOUT_MS      Request deadline (default: 15000)
    PORTICO_API_VERSIONS            Supported versions, default first (default: 1)
    PORTICO_API_KEY                 Enables API-key/bearer auth when set
    PORTICO_PUBLIC_METRICS          Serve /metrics without a key (default: false)
    PORTICO_PUBLIC_EVENTS           Serve /events without a key (default: false)
    PORTICO_LOG_LEVEL               Log filter (default: info)
    PORTICO_LOG_FORMAT              json or pretty (default: json)
    PORTICO_SHUTDOWN_TIMEOUT_MS     Grace period for open connections (default: 30000)
    PORTICO_EXPOSE_INTERNAL_ERRORS  Put internal error messages in responses (default: false)
";

fn print_help() {
    print!("{HELP}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = Args::parse()? else {
        return Ok(());
    };

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    let config = loader
        .with_optional_dotenv(&args.env_file)?
        .with_env_prefix(ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    portico::telemetry::init_logging(&config.log_config())?;
    portico::telemetry::metrics::describe_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        rate_limit_rps = config.rate_limit_rps,
        api_versions = ?config.api_versions,
        api_key = config.api_key.is_some(),
        "starting portico"
    );

    let server = App::from_config(config)?.into_server()?;
    server.run().await?;
    Ok(())
}
