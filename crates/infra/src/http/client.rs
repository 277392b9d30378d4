use std::time::Duration;

use fieldlink_common::error::{CommonError, CommonResult};
use fieldlink_domain::{ApiConfig, HttpMethod, TransportError};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::errors::IntoTransportError;

/// HTTP client bound to one API origin.
///
/// Performs exactly one physical attempt per call; retries belong to the
/// pipeline's retry controller.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    base_url: Url,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder(base_url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder::new(base_url)
    }

    /// Client for the configured API endpoint.
    pub fn from_config(config: &ApiConfig) -> CommonResult<Self> {
        Self::builder(&config.base_url)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` (optionally carrying a query string) against the base
    /// URL, keeping any path prefix the base URL has.
    pub fn url(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined)
            .map_err(|err| TransportError::ConnectionError(format!("invalid URL {joined}: {err}")))
    }

    /// Create a request builder for `path` on the underlying reqwest client.
    pub fn request(&self, method: HttpMethod, path: &str) -> Result<RequestBuilder, TransportError> {
        Ok(self.client.request(to_reqwest_method(method), self.url(path)?))
    }

    /// Execute the provided request builder once.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let request = builder.build().map_err(|err| {
            TransportError::ConnectionError(format!("request could not be built: {err}"))
        })?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, %url, status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                Err(err.into_transport())
            }
        }
    }
}

pub(crate) fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Trace => Method::TRACE,
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    base_url: String,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl HttpClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
            default_headers: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> CommonResult<HttpClient> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|err| CommonError::config_field("api.base_url", err.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CommonError::config_field("api.base_url", "must be an http(s) URL"));
        }

        let mut builder = ReqwestClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|err| CommonError::config(format!("failed to build HTTP client: {err}")))?;

        Ok(HttpClient { client, base_url })
    }
}
