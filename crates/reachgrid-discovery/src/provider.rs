//! Address providers.
//!
//! A provider returns the raw member list: plain text, one address per
//! line. [`HttpProvider`] fetches it with a single HTTP/1 GET, over TLS
//! when the URL is `https://`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{DiscoveryError, DiscoveryResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of the newline-delimited member list.
pub trait AddressProvider: Send + Sync {
    /// Where the list comes from, for logs.
    fn source(&self) -> &str;

    /// Fetch the raw list. The caller bounds this with its own timeout.
    fn fetch(&self) -> BoxFuture<'_, DiscoveryResult<String>>;
}

/// Client config trusting the Mozilla root set, with the ring provider.
pub fn default_tls_config() -> DiscoveryResult<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config =
        rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .map_err(|e| DiscoveryError::Tls(format!("protocol versions: {e}")))?
            .with_root_certificates(root_store)
            .with_no_client_auth();
    Ok(Arc::new(config))
}

#[derive(Debug, Clone)]
struct TlsTarget {
    config: Arc<rustls::ClientConfig>,
    server_name: ServerName<'static>,
}

/// Fetches the member list from an HTTP or HTTPS endpoint.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    url: String,
    uri: http::Uri,
    /// `host:port` to open the TCP connection to.
    target: String,
    tls: Option<TlsTarget>,
}

impl HttpProvider {
    /// Build a provider for `url`. URLs without a scheme are treated as
    /// `http://`; `https://` endpoints are verified against the Mozilla
    /// root set.
    pub fn new(url: &str) -> DiscoveryResult<Self> {
        Self::build(url, None)
    }

    /// Like [`HttpProvider::new`], but `https://` endpoints are verified
    /// with `config` instead of the default roots. Ignored for `http://`.
    pub fn with_tls_config(url: &str, config: Arc<rustls::ClientConfig>) -> DiscoveryResult<Self> {
        Self::build(url, Some(config))
    }

    fn build(url: &str, config: Option<Arc<rustls::ClientConfig>>) -> DiscoveryResult<Self> {
        let url = url.trim();
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("http://{url}")
        };

        let uri: http::Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| DiscoveryError::InvalidUrl(format!("{url}: {e}")))?;
        let secure = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(other) => return Err(DiscoveryError::UnsupportedScheme(other.to_string())),
            None => return Err(DiscoveryError::InvalidUrl(url)),
        };
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DiscoveryError::InvalidUrl(url.clone()))?;
        let default_port = if secure { 443 } else { 80 };
        let target = format!("{host}:{}", uri.port_u16().unwrap_or(default_port));

        let tls = if secure {
            let server_name = ServerName::try_from(host)
                .map_err(|e| DiscoveryError::InvalidUrl(format!("{url}: {e}")))?
                .to_owned();
            let config = match config {
                Some(config) => config,
                None => default_tls_config()?,
            };
            Some(TlsTarget {
                config,
                server_name,
            })
        } else {
            None
        };

        Ok(Self {
            url,
            uri,
            target,
            tls,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    async fn get(&self) -> DiscoveryResult<String> {
        let stream = tokio::net::TcpStream::connect(&self.target)
            .await
            .map_err(|e| DiscoveryError::Connect(e.to_string()))?;

        match &self.tls {
            Some(tls) => {
                let stream = tokio_rustls::TlsConnector::from(tls.config.clone())
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(|e| DiscoveryError::Tls(e.to_string()))?;
                self.exchange(stream).await
            }
            None => self.exchange(stream).await,
        }
    }

    /// One GET over an established (plain or TLS) stream.
    async fn exchange<S>(&self, stream: S) -> DiscoveryResult<String>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "provider connection closed with error");
            }
        });

        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let host = self
            .uri
            .authority()
            .map(|a| a.as_str())
            .unwrap_or(self.target.as_str());

        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", host)
            .header("accept", "text/plain")
            .header("user-agent", "reachgrid-discovery/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::Status(resp.status().as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| DiscoveryError::Http(e.to_string()))?
            .to_bytes();
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl AddressProvider for HttpProvider {
    fn source(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> BoxFuture<'_, DiscoveryResult<String>> {
        Box::pin(self.get())
    }
}
