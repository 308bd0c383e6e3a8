use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use page_summary_server::config::Config;
use page_summary_server::fetch::{FetchSettings, ReqwestFetcher};
use page_summary_server::state::AppState;

#[tokio::main]
async fn main() {
    // Load configuration — fatal on malformed values.
    let config = Config::from_env().expect("Failed to load configuration");

    // Initialize tracing — JSON in production, human-readable in dev.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "page_summary_server=info,tower_http=info"
            .parse()
            .unwrap()
    });

    if config.is_production {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("🚀 Page summary server starting...");

    if config.allow_private_targets {
        tracing::warn!("🔓 Private address guard disabled (ALLOW_PRIVATE_TARGETS)");
    }

    let fetcher = ReqwestFetcher::new(FetchSettings::from(&config))
        .expect("Failed to build HTTP client");
    info!(timeout = ?config.fetch_timeout, "📝 Fetcher configured");

    // Prometheus metrics layer
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = page_summary_server::app(AppState::new(fetcher))
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .layer(prometheus_layer);

    info!("🎧 Server listening on http://{}", config.addr);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
