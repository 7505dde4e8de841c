//! Plain HTTP access to S3-compatible object storage

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::instrument;

use crate::{BlockStoreError, Result};

/// Raw GET/PUT against object-storage URLs
#[async_trait]
pub trait DirectHttp: Send + Sync {
    /// Fetch the object at `url`
    async fn get(&self, url: &str) -> Result<Bytes>;

    /// Upload `data` to `url`, sending `extra_fields` as request headers
    async fn put(&self, url: &str, data: Bytes, extra_fields: &HashMap<String, String>) -> Result<()>;
}

/// Configuration for the object-storage HTTP client
#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("strand-blockstore/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `DirectHttp` over reqwest
#[derive(Clone)]
pub struct ReqwestHttp {
    client: Client,
}

impl ReqwestHttp {
    /// Create a client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| BlockStoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn check(url: &str, response: Response) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(BlockStoreError::NotFoundAt(url.to_string())),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(BlockStoreError::AuthFailed(format!("{} for {url}", response.status())))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BlockStoreError::Http(format!("{status} for {url}: {body}")))
            }
        }
    }
}

#[async_trait]
impl DirectHttp for ReqwestHttp {
    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await?;
        let response = Self::check(url, response).await?;
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self, data, extra_fields), fields(size = data.len()))]
    async fn put(&self, url: &str, data: Bytes, extra_fields: &HashMap<String, String>) -> Result<()> {
        let mut request = self.client.put(url).body(data);
        for (name, value) in extra_fields {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        Self::check(url, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> ReqwestHttp {
        ReqwestHttp::new(HttpConfig::default().with_timeout(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn test_get_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"block bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let data = client().get(&format!("{}/bucket/KEY", server.uri())).await.unwrap();
        assert_eq!(data.as_ref(), b"block bytes");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client().get(&format!("{}/bucket/NOPE", server.uri())).await.unwrap_err();
        assert!(matches!(err, BlockStoreError::NotFoundAt(_)));
    }

    #[tokio::test]
    async fn test_get_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client().get(&format!("{}/bucket/KEY", server.uri())).await.unwrap_err();
        assert!(matches!(err, BlockStoreError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn test_put_sends_fields_as_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/KEY"))
            .and(header("x-amz-meta-size", "5"))
            .and(body_bytes(b"hello".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fields = HashMap::from([("x-amz-meta-size".to_string(), "5".to_string())]);
        client()
            .put(&format!("{}/bucket/KEY", server.uri()), Bytes::from_static(b"hello"), &fields)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client()
            .put(&format!("{}/bucket/KEY", server.uri()), Bytes::from_static(b"x"), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BlockStoreError::Http(msg) if msg.contains("slow down")));
    }
}
