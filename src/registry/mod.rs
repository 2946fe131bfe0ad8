pub mod manifest;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use crate::error::AppError;
use manifest::{
    MANIFEST_V1_MEDIA_TYPE, MANIFEST_V2_MEDIA_TYPE, ManifestSummary, ManifestV1, ManifestV2,
    summarize,
};

const CONTENT_DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Client for the registry's own HTTP API: liveness probe, manifest
/// aggregation and the reverse proxy all go through here.
pub struct RegistryClient {
    api_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        let mut api_url = api_url.into();
        while api_url.ends_with('/') {
            api_url.pop();
        }
        Self {
            api_url,
            http: reqwest::Client::new(),
        }
    }

    /// `GET /v2/` against the upstream registry; anything but a clean 200 is
    /// reported as not alive.
    pub async fn is_alive(&self) -> bool {
        match self.http.get(format!("{}/v2/", self.api_url)).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    /// Fetches both manifest schema versions concurrently and merges them.
    pub async fn manifest_summary(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<ManifestSummary, AppError> {
        let url = format!("{}/v2/{repo}/manifests/{tag}", self.api_url);
        let (v1, v2) = tokio::join!(self.fetch_v1(&url), self.fetch_v2(&url));
        let v1 = v1?;
        let (v2, content_digest) = v2?;
        Ok(summarize(&v1, &v2, content_digest))
    }

    async fn fetch_v1(&self, url: &str) -> Result<ManifestV1, AppError> {
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, MANIFEST_V1_MEDIA_TYPE)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(AppError::UpstreamStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn fetch_v2(&self, url: &str) -> Result<(ManifestV2, String), AppError> {
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(AppError::UpstreamStatus(response.status()));
        }
        let content_digest = response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok((response.json().await?, content_digest))
    }

    /// Forwards an arbitrary request to the upstream registry and relays the
    /// answer. Everything the agent does not handle itself takes this path.
    ///
    /// Bodies are streamed through in both directions; this path carries image
    /// layers, which can be multiple gigabytes and must never be buffered
    /// whole.
    pub async fn proxy(&self, request: Request) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{path_and_query}", self.api_url);

        let forwarded_host = parts
            .headers
            .get(header::HOST)
            .cloned()
            .unwrap_or_else(|| axum::http::HeaderValue::from_static(""));

        let mut upstream = self.http.request(parts.method, url);
        for (name, value) in filtered_headers(&parts.headers) {
            upstream = upstream.header(name, value);
        }
        let response = upstream
            .header("X-Forwarded-Host", forwarded_host)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await?;

        let mut builder = Response::builder().status(response.status());
        for (name, value) in filtered_headers(response.headers()) {
            builder = builder.header(name, value);
        }
        Ok(builder.body(Body::from_stream(response.bytes_stream()))?)
    }
}

/// Hop-by-hop headers must not be relayed in either direction: the fixed set
/// plus whatever the `Connection` header names.
fn filtered_headers(
    headers: &HeaderMap,
) -> impl Iterator<Item = (&header::HeaderName, &header::HeaderValue)> {
    let connection_named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    headers.iter().filter(move |(name, _)| {
        !is_hop_by_hop(name) && !connection_named.iter().any(|named| named == name.as_str())
    })
}

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONNECTION
        || *name == header::TRANSFER_ENCODING
        || *name == header::CONTENT_LENGTH
        || *name == header::UPGRADE
        || *name == header::TE
        || *name == header::TRAILER
        || *name == header::PROXY_AUTHENTICATE
        || *name == header::PROXY_AUTHORIZATION
        || name.as_str() == "keep-alive"
}
