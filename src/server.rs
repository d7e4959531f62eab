//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! [`serve`] picks the transport from `server.transport`; both entry points
//! wire the database, embedding provider, vector store and search engines
//! into a running [`CairnTools`] handler.

use anyhow::{Context, Result};
use cairn::config::CairnConfig;
use cairn::search::engines::SearchEngines;
use cairn::{db, embedding, vector};
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};

use crate::tools::CairnTools;

/// Open the observation database and build the search engines. The vector
/// path is optional: without an embedding provider the engines run
/// keyword-only.
pub fn setup_engines(config: &CairnConfig) -> Result<Arc<SearchEngines>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let embedder = embedding::create_provider(&config.embedding)
        .context("failed to configure embedding provider")?;

    if let (Some(provider), Ok(Some(indexed_with))) =
        (&embedder, db::migrations::get_embedding_model(&conn))
    {
        if indexed_with != provider.name() {
            tracing::warn!(
                indexed_with = %indexed_with,
                configured = provider.name(),
                "embedding provider changed, run `cairn reindex` to rebuild vectors"
            );
        }
    }
    let db = Arc::new(Mutex::new(conn));
    let store = match &embedder {
        Some(_) => Some(vector::create_store(config)?),
        None => {
            tracing::info!("no embedding provider configured, search is keyword-only");
            None
        }
    };

    Ok(Arc::new(SearchEngines::new(
        db,
        embedder,
        store,
        config.search.clone(),
        &config.storage.project,
    )))
}

/// Load the default project's vector path in the background so the first
/// search does not pay for it. Failures mean misconfiguration and are logged
/// at error; search keeps working keyword-only.
fn warm_up(engines: &Arc<SearchEngines>) {
    let engines = Arc::clone(engines);
    tokio::spawn(async move {
        let engine = match engines.get(None) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "search engine setup failed");
                return;
            }
        };
        if let Err(e) = engine.search.initialize().await {
            tracing::error!(
                error = %e,
                collection = engine.search.collection(),
                "vector search initialization failed, continuing keyword-only"
            );
        }
    });
}

pub async fn serve(config: CairnConfig) -> Result<()> {
    match config.server.transport.as_str() {
        "stdio" => serve_stdio(config).await,
        "http" | "sse" => serve_http(config).await,
        other => anyhow::bail!("unknown transport: {other}. Supported: stdio, http"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: CairnConfig) -> Result<()> {
    tracing::info!("starting Cairn MCP server on stdio");

    let engines = setup_engines(&config)?;
    warm_up(&engines);

    let tools = CairnTools::new(engines);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP, mounted at `/mcp`.
pub async fn serve_http(config: CairnConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting Cairn MCP server on HTTP");

    let engines = setup_engines(&config)?;
    warm_up(&engines);

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(CairnTools::new(Arc::clone(&engines))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
