use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use onboard_agent::config::ServiceConfig;
use onboard_agent::integrations::Dispatcher;
use onboard_agent::onboarding::{Orchestrator, onboarding_routes};
use onboard_agent::stdio;
use onboard_agent::store::{JsonFile, Store};
use onboard_agent::tools::{ToolRegistry, register_onboarding_tools};
use onboard_agent::workflow::TemplateSet;

const USAGE: &str = "usage: onboard-agent [api|stdio]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// HTTP API server.
    Api,
    /// Line-delimited JSON tool server on stdin/stdout.
    Stdio,
}

fn parse_mode() -> Option<Mode> {
    match std::env::args().nth(1).as_deref() {
        None | Some("api") => Some(Mode::Api),
        Some("stdio") => Some(Mode::Stdio),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(mode) = parse_mode() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    // Logs always go to stderr so stdout stays clean for the tool protocol.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "onboard-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    eprintln!("Onboard Agent v{}", env!("CARGO_PKG_VERSION"));

    // ── Templates ────────────────────────────────────────────────────────
    let templates = match &config.workflows_path {
        Some(path) => TemplateSet::load(path)
            .with_context(|| format!("failed to load workflow templates from {}", path.display()))?,
        None => TemplateSet::builtin().context("bundled workflow templates are invalid")?,
    };
    eprintln!("   Roles: {}", templates.roles().join(", "));

    // ── Store ────────────────────────────────────────────────────────────
    let store = match &config.data_path {
        Some(path) => {
            eprintln!("   Data: {}", path.display());
            Store::open(JsonFile::new(path))
                .await
                .with_context(|| format!("failed to open employee store at {}", path.display()))?
        }
        None => {
            eprintln!("   Data: in-memory");
            Store::in_memory()
        }
    };

    // ── Engine ───────────────────────────────────────────────────────────
    let dispatcher = Dispatcher::from_config(&config.integrations, &config.engine);
    for (category, backend) in dispatcher.modes() {
        eprintln!("   {category}: {backend}");
    }
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        Arc::new(templates),
        Arc::new(dispatcher),
        config.engine.clone(),
    );

    let resumed = orchestrator.resume_incomplete().await?;
    if resumed > 0 {
        eprintln!("   Resumed {resumed} unfinished onboarding(s)");
    }

    match mode {
        Mode::Api => {
            let port = config.http_port;
            eprintln!("   API: http://0.0.0.0:{port}/api/employees\n");
            let app = onboarding_routes(orchestrator);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
                .await
                .with_context(|| format!("failed to bind port {port}"))?;
            tracing::info!(port, "HTTP API server started");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Shutting down");
                })
                .await?;
        }
        Mode::Stdio => {
            let tools = ToolRegistry::new();
            register_onboarding_tools(&tools, &orchestrator);
            eprintln!("   Tools: {} registered (send {{\"tool\": \"list_tools\"}})\n", tools.count());
            stdio::serve_stdio(&tools).await?;
        }
    }

    Ok(())
}
