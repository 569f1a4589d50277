//! Reconnect behavior against a scripted WebSocket server.

use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use tether_client::{ClientConfig, ClientError, ConnectionState, RpcClient};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type ServerWs = WebSocketStream<TcpStream>;

async fn scripted_server() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ClientConfig {
        endpoint: format!("ws://{addr}/v1/channels"),
        connect_timeout_ms: 5_000,
        reconnect_initial_ms: 10,
        reconnect_max_ms: 50,
        ..ClientConfig::default()
    };
    (listener, config)
}

async fn accept(listener: &TcpListener, n: u32) -> ServerWs {
    let (stream, _) = timeout(TIMEOUT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    let hello = json!({"type": "established", "connectionId": format!("conn_{n}")});
    ws.send(Message::Text(hello.to_string().into())).await.unwrap();
    ws
}

async fn next_frame(ws: &mut ServerWs) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Fail if the client sends another text frame within `QUIET`.
async fn assert_quiet(ws: &mut ServerWs) {
    let extra = timeout(QUIET, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(frame)) = extra {
        panic!("unexpected extra frame: {frame}");
    }
}

#[tokio::test]
async fn subscriptions_replay_in_seq_order_after_reconnect() {
    let (listener, config) = scripted_server().await;
    let client = RpcClient::new(config).unwrap();

    let mut first = accept(&listener, 1).await;
    client.wait_connected().await.unwrap();

    let a = client
        .subscribe("store", "onPriceChange", vec![json!("xxx")], |_| {})
        .unwrap();
    let b = client
        .subscribe("store", "onChange", vec![json!({"deep": true})], |_| {})
        .unwrap();
    let c = client.subscribe("feed", "onTick", vec![], |_| {}).unwrap();
    c.dispose();

    let listen_a = next_frame(&mut first).await;
    let listen_b = next_frame(&mut first).await;
    assert_eq!(listen_a["seq"], a.seq());
    assert_eq!(listen_b["seq"], b.seq());
    // c's listen and unlisten also went out on the first connection
    assert_eq!(next_frame(&mut first).await["type"], "listen");
    assert_eq!(next_frame(&mut first).await["type"], "unlisten");
    assert_quiet(&mut first).await;

    drop(first);

    let mut second = accept(&listener, 2).await;
    let replay_a = next_frame(&mut second).await;
    let replay_b = next_frame(&mut second).await;
    assert_eq!(replay_a, listen_a);
    assert_eq!(replay_b, listen_b);
    assert_eq!(replay_a["channel"], "PriceChange");
    assert_eq!(replay_b["params"], json!([{"deep": true}]));
    assert_quiet(&mut second).await;

    client.wait_connected().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn each_reconnect_replays_every_live_subscription_once() {
    let (listener, config) = scripted_server().await;
    let client = RpcClient::new(config).unwrap();

    let mut ws = accept(&listener, 1).await;
    client.wait_connected().await.unwrap();
    let a = client
        .subscribe("store", "onPriceChange", vec![json!("xxx")], |_| {})
        .unwrap();
    let b = client.subscribe("store", "onChange", vec![], |_| {}).unwrap();
    let _ = next_frame(&mut ws).await;
    let _ = next_frame(&mut ws).await;

    for n in 2..=4 {
        drop(ws);
        ws = accept(&listener, n).await;
        client.wait_connected().await.unwrap();

        let seqs = [next_frame(&mut ws).await, next_frame(&mut ws).await]
            .map(|frame| {
                assert_eq!(frame["type"], "listen");
                frame["seq"].as_u64().unwrap()
            });
        assert_eq!(seqs, [a.seq(), b.seq()]);
        assert_quiet(&mut ws).await;
    }

    // a disposed subscription stays out of later replays
    a.dispose();
    assert_eq!(next_frame(&mut ws).await["type"], "unlisten");
    drop(ws);
    let mut last = accept(&listener, 5).await;
    assert_eq!(next_frame(&mut last).await["seq"], b.seq());
    assert_quiet(&mut last).await;

    client.close().await;
}

#[tokio::test]
async fn notifications_resume_on_new_connection() {
    let (listener, config) = scripted_server().await;
    let client = RpcClient::new(config).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sub = client
        .subscribe("store", "onPriceChange", vec![json!("xxx")], move |params| {
            let _ = tx.send(params);
        })
        .unwrap();

    // the listen made before the first connect goes out as replay
    let mut first = accept(&listener, 1).await;
    let listen = next_frame(&mut first).await;
    assert_eq!(listen["seq"], sub.seq());
    assert_quiet(&mut first).await;
    drop(first);

    let mut second = accept(&listener, 2).await;
    assert_eq!(next_frame(&mut second).await, listen);
    assert_quiet(&mut second).await;
    let notify = json!({
        "type": "notify",
        "seq": sub.seq(),
        "id": "store",
        "method": "onPriceChange",
        "params": [{"name": "xxx", "price": 42}]
    });
    second.send(Message::Text(notify.to_string().into())).await.unwrap();

    let params = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(params, vec![json!({"name": "xxx", "price": 42})]);
    client.close().await;
}

#[tokio::test]
async fn pending_call_fails_once_on_drop() {
    let (listener, config) = scripted_server().await;
    let client = RpcClient::new(config).unwrap();
    let mut first = accept(&listener, 1).await;
    client.wait_connected().await.unwrap();

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call("store", "query", vec![json!("100")]).await })
    };
    let frame = next_frame(&mut first).await;
    assert_eq!(frame["type"], "call");
    drop(first);

    let result = timeout(TIMEOUT, call).await.unwrap().unwrap();
    assert_matches!(result, Err(ClientError::ConnectionLost));

    // next connection: a fresh call succeeds
    let mut second = accept(&listener, 2).await;
    client.wait_connected().await.unwrap();
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call("store", "query", vec![]).await })
    };
    let frame = next_frame(&mut second).await;
    let reply = json!({
        "type": "response",
        "requestId": frame["requestId"],
        "id": "store",
        "method": "query",
        "result": 7
    });
    second.send(Message::Text(reply.to_string().into())).await.unwrap();
    assert_eq!(timeout(TIMEOUT, call).await.unwrap().unwrap().unwrap(), json!(7));
    client.close().await;
}

#[tokio::test]
async fn state_walks_through_disconnect() {
    let (listener, config) = scripted_server().await;
    let client = RpcClient::new(config).unwrap();
    let mut states = client.state_changes();

    let first = accept(&listener, 1).await;
    client.wait_connected().await.unwrap();
    drop(first);

    // observe leaving Connected
    timeout(TIMEOUT, async {
        loop {
            states.changed().await.unwrap();
            if *states.borrow_and_update() != ConnectionState::Connected {
                break;
            }
        }
    })
    .await
    .unwrap();

    let _second = accept(&listener, 2).await;
    timeout(TIMEOUT, client.wait_connected()).await.unwrap().unwrap();
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}
