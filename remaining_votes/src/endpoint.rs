//! The Stack Exchange profile endpoints
//!
//! Both endpoints answer for `users/current`, the profile of whoever the
//! session cookie belongs to, and return HTML.

use std::time::Duration;

use metrics::counter;
use reqwest::{
    Client, Url,
    header::{self, HeaderMap, HeaderValue},
};
use tracing::{debug, info, warn};

use crate::vote::VoteKind;

const PROFILE_PATH: &str = "/users/current";

#[derive(thiserror::Error, Debug)]
/// Errors produced while setting up an [`Endpoint`] or its client
pub enum Error {
    /// The configured origin is not a usable base URL.
    #[error("Invalid origin {origin:?}: {reason}")]
    Origin {
        /// The origin as configured.
        origin: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The session cookie cannot be sent as a header value.
    #[error("Session cookie is not a valid header value")]
    Cookie,
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The profile endpoints of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    origin: Url,
}

impl Endpoint {
    /// Create a new `Endpoint` for the site at `origin`, for instance
    /// `https://stackoverflow.com`.
    ///
    /// # Errors
    ///
    /// Function will return an error if `origin` is not an absolute http(s)
    /// URL.
    pub fn new(origin: &str) -> Result<Self, Error> {
        let url = Url::parse(origin).map_err(|err| Error::Origin {
            origin: origin.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(Error::Origin {
                origin: origin.to_string(),
                reason: "expected an http or https URL".to_string(),
            });
        }
        Ok(Self { origin: url })
    }

    /// The site origin.
    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn profile(&self, query: &[(&str, &str)]) -> Url {
        let mut url = self.origin.clone();
        url.set_path(PROFILE_PATH);
        url.set_fragment(None);
        url.query_pairs_mut().clear().extend_pairs(query);
        url
    }

    /// One page of the votes tab, votes of `kind` only.
    #[must_use]
    pub fn votes(&self, kind: VoteKind, page: u32) -> Url {
        let page = page.to_string();
        self.profile(&[("tab", "votes"), ("sort", kind.as_str()), ("page", &page)])
    }

    /// The top activity tab.
    #[must_use]
    pub fn top_activity(&self) -> Url {
        self.profile(&[("tab", "topactivity")])
    }
}

/// Build the HTTP client used for every request.
///
/// # Errors
///
/// Function will return an error if the cookie is not a valid header value or
/// the client cannot be constructed.
pub fn client(session_cookie: Option<&str>, timeout: Option<Duration>) -> Result<Client, Error> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session_cookie {
        let mut value = HeaderValue::from_str(cookie).map_err(|_| Error::Cookie)?;
        value.set_sensitive(true);
        headers.insert(header::COOKIE, value);
    }

    let mut builder = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Fetch `url` as text.
///
/// Any failure, including a non-success status, is logged and yields an empty
/// body.
pub(crate) async fn fetch_text(client: &Client, url: Url, source: &'static str) -> String {
    counter!("requests_sent", "endpoint" => source).increment(1);

    let resp = match client.get(url.clone()).send().await {
        Ok(resp) => resp,
        Err(err) => {
            warn!("failed to get {url}: {err}");
            counter!("request_failure", "endpoint" => source).increment(1);
            return String::new();
        }
    };

    let status = resp.status();
    if !status.is_success() {
        info!("request to {url} returned {status}");
        counter!("request_failure", "endpoint" => source).increment(1);
        return String::new();
    }

    match resp.text().await {
        Ok(text) => {
            debug!("read {len} bytes from {url}", len = text.len());
            text
        }
        Err(err) => {
            info!("failed to read response from {url}: {err}");
            counter!("request_failure", "endpoint" => source).increment(1);
            String::new()
        }
    }
}
