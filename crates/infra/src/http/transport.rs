//! `Transport` over reqwest
//!
//! One call is one physical attempt. Non-2xx answers become
//! [`TransportError::BadResponse`] carrying the body text and any integer
//! `Retry-After`.

use async_trait::async_trait;
use fieldlink_core::Transport;
use fieldlink_domain::constants::HEADER_RETRY_AFTER;
use fieldlink_domain::{parse_retry_after, ApiRequest, ApiResponse, Headers, TransportError};
use reqwest::Response;
use tracing::{instrument, warn};

use super::client::HttpClient;
use crate::errors::IntoTransportError;

pub struct ReqwestTransport {
    client: HttpClient,
}

impl ReqwestTransport {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.path)?;
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = self.client.execute(builder).await?;
        read_response(response).await
    }
}

/// Convert a reqwest response, mapping non-2xx statuses to `BadResponse`
pub(crate) async fn read_response(response: Response) -> Result<ApiResponse, TransportError> {
    let status = response.status();
    let headers = collect_headers(&response);
    let bytes = response.bytes().await.map_err(IntoTransportError::into_transport)?;

    if !status.is_success() {
        let body = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());
        let retry_after = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(HEADER_RETRY_AFTER))
            .and_then(|(_, value)| parse_retry_after(value));
        return Err(TransportError::BadResponse { status: status.as_u16(), body, retry_after });
    }

    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }))
    };

    Ok(ApiResponse { status: status.as_u16(), headers, body })
}

fn collect_headers(response: &Response) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in response.headers() {
        match value.to_str() {
            Ok(value) => {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
            Err(_) => warn!(header = %name, "Dropping non-ASCII response header"),
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fieldlink_domain::HttpMethod;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn transport(server: &MockServer) -> ReqwestTransport {
        ReqwestTransport::new(HttpClient::builder(server.uri()).build().unwrap())
    }

    /// Validates request and response translation.
    ///
    /// Assertions:
    /// - Ensures method, query string, headers and JSON body reach the server.
    /// - Ensures the JSON response body and headers are surfaced.
    #[tokio::test]
    async fn sends_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/orders"))
            .and(query_param("dry_run", "1"))
            .and(header("Authorization", "Bearer access-1"))
            .and(body_json(json!({"sku": "A1"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Request-ID", "req-1")
                    .set_body_json(json!({"id": 7})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = ApiRequest::new(HttpMethod::Post, "/api/v1/orders?dry_run=1")
            .with_header("Authorization", "Bearer access-1")
            .with_body(json!({"sku": "A1"}));
        let response = transport(&server).await.send(&request).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, Some(json!({"id": 7})));
        assert_eq!(response.header("x-request-id"), Some("req-1"));
    }

    #[tokio::test]
    async fn non_success_carries_body_and_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "7").set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = transport(&server)
            .await
            .send(&ApiRequest::get("/api/v1/drivers"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransportError::BadResponse {
                status: 429,
                body: Some("slow down".into()),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[tokio::test]
    async fn empty_and_plain_text_bodies() {
        let server = MockServer::start().await;
        Mock::given(path("/empty")).respond_with(ResponseTemplate::new(204)).mount(&server).await;
        Mock::given(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;
        let transport = transport(&server).await;

        let empty = transport.send(&ApiRequest::get("/empty")).await.unwrap();
        let text = transport.send(&ApiRequest::get("/text")).await.unwrap();

        assert_eq!(empty.status, 204);
        assert!(empty.body.is_none());
        assert_eq!(text.body, Some(json!("pong")));
    }
}
