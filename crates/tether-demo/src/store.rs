//! The demo `store` service and its typed client.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{BuildError, Disposable, NotifySink, Service, ServiceError};

/// Service id the store registers under.
pub const STORE_ID: &str = "store";

/// Price of one symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol name.
    pub name: String,
    /// Price in whole units.
    pub price: u32,
}

/// Emission intervals of the store's feeds.
#[derive(Clone, Copy, Debug)]
pub struct StoreOptions {
    /// Interval between `onPriceChange` ticks.
    pub price_interval: Duration,
    /// Interval between `onChange` ticks.
    pub change_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            price_interval: Duration::from_secs(1),
            change_interval: Duration::from_secs(3),
        }
    }
}

tether_client::service_stub! {
    /// Typed client for the demo store.
    pub struct StoreClient("store") {
        /// Quote for a symbol.
        call query(name: String) -> Quote = "query";
        /// Random price ticks for a symbol.
        subscribe on_price_change(name: String) => Quote = "onPriceChange";
        /// RFC 3339 timestamps on every store change.
        subscribe on_change() => String = "onChange";
    }
}

/// Build the store service.
pub fn store_service(options: StoreOptions) -> Result<Service, BuildError> {
    Service::builder(STORE_ID)
        .call("query", |params| async move {
            let name = symbol_param(&params)?;
            Ok::<_, ServiceError>(serde_json::to_value(Quote { name, price: 10 })?)
        })
        .subscribe("onPriceChange", move |params, sink| {
            let name = symbol_param(&params)?;
            Ok(Some(spawn_feed(
                format!("onPriceChange({name})"),
                options.price_interval,
                sink,
                move || {
                    let price = rand::rng().random_range(0..1000);
                    serde_json::to_value(Quote {
                        name: name.clone(),
                        price,
                    })
                    .unwrap_or(Value::Null)
                },
            )))
        })
        .subscribe("onChange", move |_params, sink| {
            Ok(Some(spawn_feed(
                "onChange".to_owned(),
                options.change_interval,
                sink,
                || Value::String(chrono::Utc::now().to_rfc3339()),
            )))
        })
        .build()
}

fn symbol_param(params: &[Value]) -> Result<String, ServiceError> {
    params
        .first()
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ServiceError::named("InvalidParams", "expected a symbol name"))
}

/// Emit `next()` every `interval` until the sink closes or the handle is disposed.
fn spawn_feed(
    label: String,
    interval: Duration,
    sink: NotifySink,
    next: impl Fn() -> Value + Send + 'static,
) -> Disposable {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        let _ = ticker.tick().await;
        loop {
            let _ = ticker.tick().await;
            if !sink.emit(next()) {
                tracing::debug!(seq = sink.seq(), method = sink.method(), "feed stopped");
                break;
            }
        }
    });
    Disposable::from_task(label, task)
}
