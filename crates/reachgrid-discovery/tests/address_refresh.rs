//! End-to-end address refresh scenarios against scripted and HTTP providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use reach_core::{ClientConfig, RequestChannel, RequestSchema, ServerAddress};
use reachgrid_discovery::{
    AddressPicker, AddressProvider, BoxFuture, DiscoveryError, DiscoveryResult, RequestClient,
    ServerAddressesReader, ServerList,
};

/// Provider whose next answer the test controls.
struct Scripted {
    body: Mutex<DiscoveryResult<String>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Ok(body.to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    fn answer(&self, body: &str) {
        *self.body.lock().unwrap() = Ok(body.to_string());
    }

    fn fail(&self) {
        *self.body.lock().unwrap() = Err(DiscoveryError::Status(500));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AddressProvider for Scripted {
    fn source(&self) -> &str {
        "scripted"
    }

    fn fetch(&self) -> BoxFuture<'_, DiscoveryResult<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match &*self.body.lock().unwrap() {
            Ok(body) => Ok(body.clone()),
            Err(_) => Err(DiscoveryError::Status(500)),
        };
        Box::pin(async move { result })
    }
}

fn http_config() -> ClientConfig {
    ClientConfig {
        channel: RequestChannel::Http,
        ..ClientConfig::default()
    }
}

fn hosts(list: &ServerList) -> Vec<String> {
    list.addresses().into_iter().map(|a| a.to_string()).collect()
}

async fn wait_for_generation(list: &ServerList, generation: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while list.generation() < generation {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("generation never reached");
}

#[tokio::test]
async fn refresh_only_when_sorted_list_changes() {
    let provider = Scripted::new("10.0.0.2:8080\n10.0.0.1:8080\n");
    let list = Arc::new(ServerList::new(RequestChannel::Http));
    let reader =
        ServerAddressesReader::with_provider(&http_config(), list.clone(), provider.clone());

    assert!(reader.read().await.unwrap());
    assert_eq!(
        hosts(&list),
        vec!["http://10.0.0.1:8080", "http://10.0.0.2:8080"]
    );
    assert_eq!(list.generation(), 1);
    assert!(list.is_started());

    // Same members in a different order, plus noise.
    provider.answer("\n10.0.0.1:8080\n   \n10.0.0.2:8080");
    assert!(!reader.read().await.unwrap());
    assert_eq!(list.generation(), 1);

    provider.answer("10.0.0.1:8080\n10.0.0.2:8080\n10.0.0.3:8080\n");
    assert!(reader.read().await.unwrap());
    assert_eq!(list.generation(), 2);
    assert_eq!(list.addresses().len(), 3);
}

#[tokio::test]
async fn failed_read_keeps_last_known_addresses() {
    let provider = Scripted::new("10.0.0.1:8080\n");
    let list = Arc::new(ServerList::new(RequestChannel::Http));
    let reader =
        ServerAddressesReader::with_provider(&http_config(), list.clone(), provider.clone());
    reader.read().await.unwrap();

    provider.fail();
    assert!(matches!(
        reader.read().await,
        Err(DiscoveryError::Status(500))
    ));
    assert_eq!(hosts(&list), vec!["http://10.0.0.1:8080"]);
    assert_eq!(reader.cached_addresses().len(), 1);
    assert_eq!(list.generation(), 1);
}

#[tokio::test]
async fn try_start_reads_inline_when_client_is_empty() {
    let provider = Scripted::new("10.0.0.1:8080\n");
    let list = Arc::new(ServerList::new(RequestChannel::Http));
    let reader = Arc::new(ServerAddressesReader::with_provider(
        &http_config(),
        list.clone(),
        provider.clone(),
    ));

    assert!(reader.try_start().await);
    // Routable as soon as try_start returns.
    assert_eq!(list.next_address().unwrap().to_string(), "http://10.0.0.1:8080");
    assert_eq!(provider.calls(), 1);

    assert!(!reader.try_start().await);
    assert!(reader.is_started());
    assert_eq!(provider.calls(), 1);
    reader.stop();
}

#[tokio::test]
async fn try_start_defers_read_when_client_has_addresses() {
    let provider = Scripted::new("10.0.0.7:8080\n");
    let list = Arc::new(ServerList::new(RequestChannel::Http));
    let seeded = ServerAddress::parse("10.0.0.1:8080", RequestSchema::Http).unwrap();
    list.change_addresses(AddressPicker::new(vec![seeded]));

    let reader = Arc::new(ServerAddressesReader::with_provider(
        &http_config(),
        list.clone(),
        provider.clone(),
    ));
    assert!(reader.try_start().await);

    wait_for_generation(&list, 2).await;
    assert_eq!(hosts(&list), vec!["http://10.0.0.7:8080"]);
    reader.stop();
}

#[tokio::test]
async fn background_loop_keeps_polling_after_failures() {
    let cfg = ClientConfig {
        read_interval: Some("20ms".to_string()),
        ..http_config()
    };
    let provider = Scripted::new("10.0.0.1:8080\n");
    provider.fail();
    let list = Arc::new(ServerList::new(RequestChannel::Http));
    let reader = Arc::new(ServerAddressesReader::with_provider(
        &cfg,
        list.clone(),
        provider.clone(),
    ));

    assert!(reader.try_start().await);
    assert_eq!(list.generation(), 0);

    provider.answer("10.0.0.1:8080\n");
    wait_for_generation(&list, 1).await;
    assert!(provider.calls() >= 2);

    reader.stop();
    let calls = provider.calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.calls(), calls);
}

#[tokio::test]
async fn http_provider_feeds_grpc_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = "10.1.0.2:9848\n10.1.0.1:9848\n";
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    let cfg = ClientConfig {
        servers: vec!["grpc://10.1.0.9:9848".to_string()],
        servers_provider_url: Some(format!("{addr}/members")),
        ..ClientConfig::default()
    };
    let list = Arc::new(ServerList::new(RequestChannel::Grpc));
    let reader = Arc::new(ServerAddressesReader::new(&cfg, list.clone()).unwrap());
    assert!(reader.try_start().await);

    assert_eq!(
        hosts(&list),
        vec![
            "grpc://10.1.0.1:9848",
            "grpc://10.1.0.2:9848",
            "grpc://10.1.0.9:9848"
        ]
    );
    reader.stop();
}
