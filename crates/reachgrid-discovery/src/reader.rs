//! Background reader for the provider address list.
//!
//! The reader polls an [`AddressProvider`] on a fixed interval and pushes
//! the merged address set (static servers plus provider entries) into the
//! request client, but only when the provider's sorted list changed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reach_core::address::parse_addresses;
use reach_core::{ClientConfig, RequestSchema, ServerAddress};

use crate::balancer::AddressPicker;
use crate::client::RequestClient;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::provider::{AddressProvider, HttpProvider};

pub struct ServerAddressesReader {
    /// Statically configured entries, merged into every refresh.
    servers: Vec<String>,
    schema: RequestSchema,
    interval: Duration,
    timeout: Duration,
    provider: Option<Arc<dyn AddressProvider>>,
    client: Arc<dyn RequestClient>,
    started: AtomicBool,
    /// Last sorted provider list. Also serializes refreshes.
    cached: Mutex<Vec<ServerAddress>>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServerAddressesReader {
    /// Build a reader from client config. A configured provider URL is
    /// validated here; a missing or blank one leaves the reader inert.
    pub fn new(config: &ClientConfig, client: Arc<dyn RequestClient>) -> DiscoveryResult<Self> {
        let provider = match config.provider_url() {
            Some(url) => Some(Arc::new(HttpProvider::new(url)?) as Arc<dyn AddressProvider>),
            None => None,
        };
        Ok(Self::build(config, client, provider))
    }

    /// Build a reader around an explicit provider.
    pub fn with_provider(
        config: &ClientConfig,
        client: Arc<dyn RequestClient>,
        provider: Arc<dyn AddressProvider>,
    ) -> Self {
        Self::build(config, client, Some(provider))
    }

    fn build(
        config: &ClientConfig,
        client: Arc<dyn RequestClient>,
        provider: Option<Arc<dyn AddressProvider>>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            servers: config.servers.clone(),
            schema: RequestSchema::find_by_channel(client.channel(), config.tls_enabled),
            interval: config.read_interval(),
            timeout: config.request_timeout(),
            provider,
            client,
            started: AtomicBool::new(false),
            cached: Mutex::new(Vec::new()),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Start polling the provider.
    ///
    /// Does nothing without a provider, and only the first call starts the
    /// loop. When the client has no addresses yet, the first read happens
    /// inline so callers can route requests as soon as this returns.
    /// Returns `true` if this call started the loop.
    pub async fn try_start(self: &Arc<Self>) -> bool {
        let Some(provider) = self.provider.as_ref() else {
            debug!("no servers provider configured, address reader not started");
            return false;
        };
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let first_delay = if self.client.addresses().is_empty() {
            self.tick().await;
            self.interval
        } else {
            Duration::ZERO
        };

        let reader = Arc::clone(self);
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            reader.run(first_delay, shutdown).await;
        });
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            source = provider.source(),
            interval = ?self.interval,
            timeout = ?self.timeout,
            "server address reader started"
        );
        true
    }

    /// Stop the background loop.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            info!("server address reader stopped");
        }
    }

    async fn run(self: Arc<Self>, first_delay: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut delay = first_delay;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    debug!("address read loop shutting down");
                    break;
                }
            }
            delay = self.interval;
        }
    }

    /// One read whose failure is only logged.
    async fn tick(&self) {
        if let Err(e) = self.read().await {
            warn!(
                source = self.provider.as_ref().map(|p| p.source()).unwrap_or_default(),
                error = %e,
                "failed to read servers from provider"
            );
        }
    }

    /// Fetch the provider list once and refresh the client if it changed.
    ///
    /// Returns whether the client's addresses were replaced. On error the
    /// cached list and the client are left untouched.
    pub async fn read(&self) -> DiscoveryResult<bool> {
        let Some(provider) = self.provider.as_ref() else {
            return Ok(false);
        };
        let body = tokio::time::timeout(self.timeout, provider.fetch())
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout))??;

        let addresses = parse_addresses(body.lines(), self.schema);
        {
            let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
            if *cached == addresses {
                debug!(count = addresses.len(), "provider addresses unchanged");
                return Ok(false);
            }
            *cached = addresses;
        }
        self.refresh_server_address();
        Ok(true)
    }

    /// Push static servers merged with the cached provider list into the
    /// client, then make sure the client is started.
    pub fn refresh_server_address(&self) {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = parse_addresses(&self.servers, self.schema);
        all.extend(cached.iter().cloned());
        all.sort();
        all.dedup();

        debug!(
            configured = self.servers.len(),
            provided = cached.len(),
            merged = all.len(),
            "refreshing server addresses"
        );
        self.client.change_addresses(AddressPicker::new(all));
        self.client.start();
    }

    /// Sorted provider list from the last successful read.
    pub fn cached_addresses(&self) -> Vec<ServerAddress> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
