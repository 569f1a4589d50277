//! Typed service stubs.
//!
//! [`service_stub!`](crate::service_stub) declares a struct wrapping a
//! [`ServiceProxy`](crate::ServiceProxy) with one typed method per remote
//! method. Each method is declared `call` or `subscribe` up front, so a
//! mistyped kind fails to compile instead of failing on the wire.
//!
//! ```ignore
//! tether_client::service_stub! {
//!     /// Typed client for the store.
//!     pub struct StoreClient("store") {
//!         /// Current quote.
//!         call query(symbol: String) -> Quote = "query";
//!         /// Price updates for one symbol.
//!         subscribe on_price_change(symbol: String) => Quote = "onPriceChange";
//!     }
//! }
//! ```
//!
//! Arguments serialize to positional params. A notification with a single
//! param decodes that param; with several, the whole list decodes (into a
//! tuple, say).

/// Declare a typed stub for one service. See the [module docs](crate::stub).
#[macro_export]
macro_rules! service_stub {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident($service:literal) {
            $($body:tt)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            proxy: $crate::ServiceProxy,
        }

        #[allow(dead_code)]
        impl $name {
            /// Service id this stub targets.
            pub const SERVICE_ID: &'static str = $service;

            /// Bind the stub to a client.
            pub fn new(client: &$crate::RpcClient) -> Self {
                Self {
                    proxy: client.service($service),
                }
            }

            /// Untyped proxy underneath.
            pub fn proxy(&self) -> &$crate::ServiceProxy {
                &self.proxy
            }

            $crate::service_stub!(@methods $($body)*);
        }
    };

    (@methods) => {};

    (@methods
        $(#[$m:meta])*
        call $fn_name:ident($($arg:ident : $ty:ty),* $(,)?) -> $ret:ty = $wire:literal;
        $($rest:tt)*
    ) => {
        $(#[$m])*
        pub async fn $fn_name(&self $(, $arg: $ty)*) -> ::std::result::Result<$ret, $crate::ClientError> {
            let params: ::std::vec::Vec<$crate::__private::Value> =
                ::std::vec![$($crate::__private::to_value(&$arg)?),*];
            let value = self.proxy.call($wire, params).await?;
            ::std::result::Result::Ok($crate::__private::from_value(value)?)
        }

        $crate::service_stub!(@methods $($rest)*);
    };

    (@methods
        $(#[$m:meta])*
        subscribe $fn_name:ident($($arg:ident : $ty:ty),* $(,)?) => $event:ty = $wire:literal;
        $($rest:tt)*
    ) => {
        $(#[$m])*
        pub fn $fn_name<H>(&self $(, $arg: $ty)*, handler: H) -> ::std::result::Result<$crate::Subscription, $crate::ClientError>
        where
            H: Fn($event) + Send + Sync + 'static,
        {
            let params: ::std::vec::Vec<$crate::__private::Value> =
                ::std::vec![$($crate::__private::to_value(&$arg)?),*];
            self.proxy.subscribe($wire, params, move |params| {
                match $crate::__private::decode_notification::<$event>(params) {
                    ::std::result::Result::Ok(event) => handler(event),
                    ::std::result::Result::Err(err) => $crate::__private::undecodable($wire, &err),
                }
            })
        }

        $crate::service_stub!(@methods $($rest)*);
    };
}

#[doc(hidden)]
pub mod __private {
    pub use serde_json::Value;
    pub use serde_json::{from_value, to_value};

    use serde::de::DeserializeOwned;

    /// Decode notification params into the stub's event type.
    pub fn decode_notification<T: DeserializeOwned>(
        mut params: Vec<Value>,
    ) -> Result<T, serde_json::Error> {
        if params.len() == 1 {
            serde_json::from_value(params.remove(0))
        } else {
            serde_json::from_value(Value::Array(params))
        }
    }

    /// Log a notification the stub could not decode.
    pub fn undecodable(method: &str, err: &serde_json::Error) {
        tracing::warn!(method, error = %err, "dropping undecodable notification");
    }
}

#[cfg(test)]
mod tests {
    use super::__private::decode_notification;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Quote {
        name: String,
        price: u32,
    }

    #[test]
    fn single_param_decodes_directly() {
        let quote: Quote = decode_notification(vec![json!({"name": "x", "price": 3})]).unwrap();
        assert_eq!(
            quote,
            Quote {
                name: "x".into(),
                price: 3
            }
        );
    }

    #[test]
    fn several_params_decode_as_tuple() {
        let pair: (String, u32) = decode_notification(vec![json!("x"), json!(3)]).unwrap();
        assert_eq!(pair, ("x".to_owned(), 3));
    }

    #[test]
    fn no_params_decode_as_empty_list() {
        let empty: Vec<u32> = decode_notification(vec![]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn wrong_shape_is_error() {
        assert!(decode_notification::<Quote>(vec![json!("nope")]).is_err());
    }

    crate::service_stub! {
        /// Stub used by the expansion test.
        pub struct EchoClient("echo") {
            /// Echo a value.
            call echo(value: String) -> String = "echo";
            call ping() -> bool = "ping";
            /// Tick stream.
            subscribe on_tick(every_ms: u64) => u64 = "onTick";
        }
    }

    #[tokio::test]
    async fn stub_expands_and_registers_subscriptions() {
        let client = crate::RpcClient::new(crate::ClientConfig {
            endpoint: "ws://127.0.0.1:9/v1/channels".into(),
            reconnect_initial_ms: 10,
            reconnect_max_ms: 20,
            ..crate::ClientConfig::default()
        })
        .unwrap();
        let echo = EchoClient::new(&client);
        assert_eq!(EchoClient::SERVICE_ID, "echo");
        assert_eq!(echo.proxy().id(), "echo");

        let sub = echo.on_tick(50, |_tick| {}).unwrap();
        assert_eq!(sub.channel(), "Tick");
        assert_eq!(client.subscription_count(), 1);
        client.close().await;
    }
}
