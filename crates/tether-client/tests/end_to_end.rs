//! Client against a real tether server.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use tether_client::{ClientConfig, ClientError, ConnectionState, ProxyMethod, RpcClient};
use tether_core::{Disposable, Service, ServiceError};
use tether_server::{ServerConfig, ServiceRegistry, TetherServer};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Quote {
    name: String,
    price: u64,
}

tether_client::service_stub! {
    /// Typed store client.
    pub struct StoreClient("store") {
        /// Quote for a symbol.
        call query(symbol: String) -> Quote = "query";
        /// Always fails.
        call fail() -> Value = "fail";
        /// Price ticks for a symbol.
        subscribe on_price_change(symbol: String) => Quote = "onPriceChange";
    }
}

fn store_service() -> Service {
    Service::builder("store")
        .call("query", |params| async move {
            let name = params.first().and_then(Value::as_str).unwrap_or("?").to_owned();
            Ok::<_, ServiceError>(json!({"name": name, "price": 100}))
        })
        .call("fail", |_| async {
            Err::<Value, _>(ServiceError::named("OutOfStock", "no more").with_code(42))
        })
        .call("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ServiceError>(Value::Null)
        })
        .subscribe("onPriceChange", |params, sink| {
            let name = params.first().and_then(Value::as_str).unwrap_or("?").to_owned();
            let task = tokio::spawn(async move {
                let mut price = 100;
                loop {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    price += 1;
                    if !sink.emit(json!({"name": name, "price": price})) {
                        break;
                    }
                }
            });
            Ok(Some(Disposable::from_task("price-feed", task)))
        })
        .build()
        .unwrap()
}

async fn boot() -> (Arc<TetherServer>, ClientConfig) {
    let mut registry = ServiceRegistry::new();
    let _ = registry.register(store_service());
    let server = Arc::new(TetherServer::new(ServerConfig::default(), registry));
    let (addr, _handle) = server.listen().await.unwrap();
    let config = ClientConfig {
        endpoint: format!("ws://{addr}/v1/channels"),
        connect_timeout_ms: 5_000,
        reconnect_initial_ms: 20,
        reconnect_max_ms: 100,
        ..ClientConfig::default()
    };
    (server, config)
}

#[tokio::test]
async fn connect_reports_connected_with_id() {
    let (_server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    // established arrives right after the upgrade
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while client.connection_id().is_none() {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(client.connection_id().unwrap().starts_with("conn_"));
    client.close().await;
}

#[tokio::test]
async fn call_through_proxy_and_stub() {
    let (_server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();

    let raw = client
        .service("store")
        .call("query", vec![json!("xxx")])
        .await
        .unwrap();
    assert_eq!(raw, json!({"name": "xxx", "price": 100}));

    let quote: Quote = client
        .call_as("store", "query", vec![json!("yyy")])
        .await
        .unwrap();
    assert_eq!(quote.name, "yyy");

    let store = StoreClient::new(&client);
    let typed = store.query("zzz".into()).await.unwrap();
    assert_eq!(
        typed,
        Quote {
            name: "zzz".into(),
            price: 100
        }
    );

    let store_proxy = client.service("store");
    let ProxyMethod::Call(query) = store_proxy.method("query") else {
        panic!("query should be call-kind");
    };
    assert_eq!(query.invoke(vec![json!("a")]).await.unwrap()["name"], "a");
    client.close().await;
}

#[tokio::test]
async fn concurrent_calls_correlate() {
    let (_server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();

    let calls = (0..20).map(|i| {
        let client = client.clone();
        async move { client.call("store", "query", vec![json!(format!("s{i}"))]).await }
    });
    let results = futures::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap()["name"], format!("s{i}"));
    }
    client.close().await;
}

#[tokio::test]
async fn remote_errors_surface() {
    let (_server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();

    let err = client.call("store", "missing", vec![]).await.unwrap_err();
    assert!(err.is_method_not_found());
    assert_eq!(err.to_string(), "[tether rpc] Method not found");

    let err = client.call("nobody", "query", vec![]).await.unwrap_err();
    assert!(err.is_method_not_found());

    let err = StoreClient::new(&client).fail().await.unwrap_err();
    assert_matches!(
        err,
        ClientError::Remote { code: 42, ref name, .. } if name.as_deref() == Some("OutOfStock")
    );
    client.close().await;
}

#[tokio::test]
async fn request_timeout_applies() {
    let (_server, mut config) = boot().await;
    config.request_timeout_ms = 100;
    let client = RpcClient::connect(config).await.unwrap();

    let err = client.call("store", "slow", vec![]).await.unwrap_err();
    assert_matches!(err, ClientError::Timeout { timeout_ms: 100, .. });
    // connection is still usable
    assert!(client.call("store", "query", vec![json!("a")]).await.is_ok());
    client.close().await;
}

#[tokio::test]
async fn typed_subscription_delivers_in_order_until_disposed() {
    let (_server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();
    let store = StoreClient::new(&client);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = store
        .on_price_change("xxx".into(), move |quote| {
            let _ = tx.send(quote);
        })
        .unwrap();

    let first: Quote = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    let second: Quote = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.name, "xxx");
    assert!(second.price > first.price);

    sub.dispose();
    assert_eq!(client.subscription_count(), 0);
    // drain anything already in flight, then expect silence
    tokio::time::sleep(Duration::from_millis(100)).await;
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    client.close().await;
}

#[tokio::test]
async fn raw_subscription_receives_params() {
    let (_server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = client
        .service("store")
        .subscribe("onPriceChange", vec![json!("raw")], move |params| {
            sink.lock().push(params);
        })
        .unwrap();

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while seen.lock().len() < 2 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let first = seen.lock()[0].clone();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["name"], "raw");
    sub.dispose();
    client.close().await;
}

#[tokio::test]
async fn server_shutdown_fails_pending_call() {
    let (server, config) = boot().await;
    let client = RpcClient::connect(config).await.unwrap();

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.call("store", "slow", vec![]).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.shutdown().shutdown();

    let result = timeout(TIMEOUT, pending).await.unwrap().unwrap();
    assert_matches!(result, Err(ClientError::ConnectionLost));
    client.close().await;
}
