mod dev_auth;
mod stub;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tmi_collab::state::AppState;
use tmi_ratelimit::SlidingWindowLimiter;
use tmi_webhooks::{DispatcherConfig, InvocationStore, run_cascade_sweep, run_reaper, spawn_dispatcher};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tmi-collab-server", about = "Real-time diagram collaboration core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the collaboration server (default when no subcommand is given).
    Serve,
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as resolved from file + env.
    Show,
    /// Validate the effective configuration and report diagnostics.
    Validate,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_thread_ids(false)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tmi-collab-server starting");

    match cli.command {
        None | Some(Commands::Serve) => serve(cli.bind).await,
        Some(Commands::Config { action }) => config_command(action),
    }
}

fn config_command(action: ConfigAction) -> anyhow::Result<()> {
    let config = tmi_config::discover_and_load();
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Validate => {
            let result = tmi_config::validate(&config);
            for diagnostic in &result.diagnostics {
                println!("[{}] {}: {}", diagnostic.severity, diagnostic.path, diagnostic.message);
            }
            if result.has_errors() {
                anyhow::bail!("configuration has {} error(s)", result.diagnostics.len());
            }
            println!("configuration OK");
            Ok(())
        }
    }
}

async fn serve(bind_override: Option<String>) -> anyhow::Result<()> {
    let config = tmi_config::discover_and_load();
    let diagnostics = tmi_config::validate(&config);
    for diagnostic in &diagnostics.diagnostics {
        match diagnostic.severity {
            tmi_config::Severity::Error => tracing::error!(path = diagnostic.path, "{}", diagnostic.message),
            tmi_config::Severity::Warning => tracing::warn!(path = diagnostic.path, "{}", diagnostic.message),
        }
    }
    if diagnostics.has_errors() {
        anyhow::bail!("refusing to start with invalid configuration");
    }

    #[cfg(feature = "metrics")]
    let _metrics_handle = tmi_metrics::init_metrics(tmi_metrics::MetricsRecorderConfig {
        enabled: true,
        prefix: Some("tmi_collab".to_string()),
        global_labels: Vec::new(),
    })?;

    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let limiter_conn = redis_client.get_connection_manager().await?;
    let invocation_conn = redis_client.get_connection_manager().await?;

    let limiter = SlidingWindowLimiter::new(limiter_conn);
    let invocations = InvocationStore::new(invocation_conn);
    let subscriptions: Arc<dyn tmi_webhooks::SubscriptionProvider> = Arc::new(stub::NoSubscriptions);
    let diagram_store: Arc<dyn tmi_collab::auth::DiagramStore> = Arc::new(stub::InMemoryDiagramStore::default());
    let http = reqwest::Client::new();

    let dispatch = spawn_dispatcher(
        DispatcherConfig { queue_capacity: config.webhook.queue_capacity, worker_count: config.webhook.worker_pool_size },
        invocations.clone(),
        Arc::clone(&subscriptions),
        http.clone(),
    );

    tokio::spawn(run_reaper(invocations.clone()));
    tokio::spawn(run_cascade_sweep(Arc::clone(&subscriptions)));

    let hub = tmi_collab::Hub::new(Arc::clone(&diagram_store));
    let behind_proxy = config.server.behind_proxy;
    let state = AppState { hub, limiter, invocations, dispatch, subscriptions, diagram_store, http, behind_proxy };

    let bind_addr = bind_override.unwrap_or_else(|| config.server.bind_addr.clone());
    let hostname = hostname::get().map(|h| h.to_string_lossy().into_owned()).unwrap_or_else(|_| "unknown".to_string());

    let app = tmi_collab::router(state)
        .layer(axum::middleware::from_fn(dev_auth::attach_identity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind_addr = %bind_addr, host = %hostname, "tmi-collab-server listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
