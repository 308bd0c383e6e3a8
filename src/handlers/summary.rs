use axum::extract::{Query, State};
use axum::Json;
use encoding_rs::UTF_8;
use serde::Deserialize;
use tokio_util::io::SyncIoBridge;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::extract::SummaryExtractor;
use crate::fetch::FetchedPage;
use crate::models::PageSummary;
use crate::state::AppState;

// ── Query params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub url: Option<String>,
}

// ── Handler ────────────────────────────────────────────────────────────────

/// GET /v1/summary?url=<encoded-url>
///
/// Fetches the page and returns the metadata found in its `<head>`.
pub async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> AppResult<Json<PageSummary>> {
    let page_url = params
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(AppError::MissingParameter("url"))?;

    // ── Validate URL ──────────────────────────────────────────────────────
    let parsed =
        Url::parse(page_url.trim()).map_err(|_| AppError::Validation("Invalid URL".into()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(AppError::Validation(
                "Only http/https URLs are supported".into(),
            ))
        }
    }
    if parsed.host_str().is_none() {
        return Err(AppError::Validation("URL has no host".into()));
    }

    // ── Fetch and extract ─────────────────────────────────────────────────
    let page = state.fetcher.fetch(&parsed).await.map_err(|e| {
        tracing::warn!(error = %e, url = %parsed, "Failed to fetch page for summary");
        AppError::from(e)
    })?;

    let summary = summarize(parsed, page).await?;
    Ok(Json(summary))
}

/// Runs the blocking extractor over the page body on the blocking pool.
async fn summarize(page_url: Url, page: FetchedPage) -> AppResult<PageSummary> {
    let encoding = page.encoding.unwrap_or(UTF_8);
    let reader = SyncIoBridge::new(page.body);

    let extraction = tokio::task::spawn_blocking(move || {
        SummaryExtractor::new(page_url.as_str())?
            .with_encoding(encoding)
            .extract(reader)
            .map(|extraction| (page_url, extraction))
    })
    .await
    .map_err(|e| {
        tracing::error!(error = ?e, "Summary extraction task failed");
        AppError::Internal
    })?;

    let (page_url, extraction) = extraction?;
    if !extraction.anomalies.is_empty() {
        tracing::debug!(
            url = %page_url,
            anomalies = extraction.anomalies.len(),
            "Recovered from malformed head metadata"
        );
    }
    Ok(extraction.summary)
}
