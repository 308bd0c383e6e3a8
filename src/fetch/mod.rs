use std::fmt;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::Encoding;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::{Host, Url};

use crate::config::Config;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REDIRECT_LIMIT: usize = 5;
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; PageSummaryBot/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Forward-only page body. Dropping it releases the underlying connection.
pub type HtmlStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream responded with status {0}")]
    BadStatus(u16),

    #[error("content type {0:?} is not text/html")]
    NonHtmlContent(String),

    #[error("request failed: {0}")]
    NetworkFailure(String),

    #[error("request timed out")]
    Timeout,

    #[error("{0} resolves to a private or reserved address")]
    PrivateAddress(String),
}

/// A validated HTML response whose body has not been read yet.
pub struct FetchedPage {
    pub content_type: String,
    /// Decoder named by the `charset` parameter, when it is a known label.
    pub encoding: Option<&'static Encoding>,
    pub body: HtmlStream,
}

impl FetchedPage {
    pub fn new(content_type: impl Into<String>, body: HtmlStream) -> Self {
        let content_type = content_type.into();
        let encoding =
            charset(&content_type).and_then(|label| Encoding::for_label(label.as_bytes()));
        Self {
            content_type,
            encoding,
            body,
        }
    }
}

impl fmt::Debug for FetchedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedPage")
            .field("content_type", &self.content_type)
            .field("encoding", &self.encoding.map(Encoding::name))
            .finish_non_exhaustive()
    }
}

/// Retrieves HTML pages for summarizing.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub redirect_limit: usize,
    pub block_private_addresses: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            block_private_addresses: true,
        }
    }
}

impl From<&Config> for FetchSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.fetch_timeout,
            user_agent: config.user_agent.clone(),
            redirect_limit: config.redirect_limit,
            block_private_addresses: !config.allow_private_targets,
        }
    }
}

/// [`Fetcher`] backed by a shared `reqwest` client.
///
/// Redirects are followed here rather than by the client, so every hop goes
/// through the private address check.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    redirect_limit: usize,
    block_private_addresses: bool,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;
        Ok(Self {
            client,
            redirect_limit: settings.redirect_limit,
            block_private_addresses: settings.block_private_addresses,
        })
    }

    /// Sends a GET for `url` and follows up to `redirect_limit` redirects,
    /// running `check` on each target before it is requested.
    async fn send<F, Fut>(&self, url: &Url, check: F) -> Result<reqwest::Response, FetchError>
    where
        F: Fn(Url) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), FetchError>> + Send,
    {
        let mut url = url.clone();
        let mut hops = 0;
        loop {
            check(url.clone()).await?;
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let Some(next) = redirect_target(&url, &response) else {
                return Ok(response);
            };
            if hops == self.redirect_limit {
                return Err(FetchError::NetworkFailure(format!(
                    "stopped after {hops} redirects"
                )));
            }
            hops += 1;
            tracing::debug!(from = %url, to = %next, "Following redirect");
            url = next;
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = if self.block_private_addresses {
            self.send(url, |hop| async move { ensure_public_host(&hop).await })
                .await?
        } else {
            self.send(url, |_| async { Ok(()) }).await?
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_html(&content_type) {
            return Err(FetchError::NonHtmlContent(content_type));
        }

        let body = response.bytes_stream().map_err(body_read_error);
        Ok(FetchedPage::new(
            content_type,
            Box::pin(StreamReader::new(body)),
        ))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::NetworkFailure(err.to_string())
    }
}

/// A timeout while streaming the body keeps its kind so it is reported as one.
fn body_read_error(err: reqwest::Error) -> io::Error {
    let kind = if err.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, err)
}

/// The next URL to request when `response` is an HTTP redirect with a usable
/// `Location`.
fn redirect_target(current: &Url, response: &reqwest::Response) -> Option<Url> {
    if !matches!(
        response.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current
        .join(location)
        .ok()
        .filter(|next| matches!(next.scheme(), "http" | "https"))
}

/// True when the media type of `content_type` is `text/html`.
pub fn is_html(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("text/html"))
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\''].as_ref()))
    })
}

/// Returns `true` if `ip` is loopback, private, link-local or otherwise not
/// publicly routable.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || first & 0xfe00 == 0xfc00
                || first & 0xffc0 == 0xfe80
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

/// Resolves the URL's host and rejects it if any address is private.
async fn ensure_public_host(url: &Url) -> Result<(), FetchError> {
    let port = url.port_or_known_default().unwrap_or(80);
    let addrs: Vec<IpAddr> = match url.host() {
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(domain)) => tokio::net::lookup_host((domain, port))
            .await
            .map_err(|e| FetchError::NetworkFailure(format!("could not resolve {domain}: {e}")))?
            .map(|addr| addr.ip())
            .collect(),
        None => return Err(FetchError::NetworkFailure("URL has no host".into())),
    };

    match addrs.iter().find(|ip| is_private_ip(**ip)) {
        Some(ip) => {
            tracing::warn!(url = %url, %ip, "Refusing to fetch private address");
            Err(FetchError::PrivateAddress(
                url.host_str().unwrap_or_default().to_string(),
            ))
        }
        None => Ok(()),
    }
}
