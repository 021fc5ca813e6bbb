use std::sync::Arc;

use anyhow::Context;

use mail_cluster::config::AppConfig;
use mail_cluster::mail::{ImapSource, MailSource};
use mail_cluster::web::{AppState, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("📬 mail-cluster v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{}", config.imap.host, config.imap.port);
    eprintln!("   Max emails per request: {}", config.imap.max_messages);
    eprintln!(
        "   Clustering: seed {}, top {} terms, {} inits",
        config.cluster.seed, config.cluster.top_terms, config.cluster.n_init
    );
    eprintln!("   Form: http://{}/\n", config.bind);

    let source: Arc<dyn MailSource> = Arc::new(ImapSource::new(config.imap.clone()));
    let app = routes(AppState {
        source,
        params: config.cluster.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
