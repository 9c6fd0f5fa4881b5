//! Tower logging layer for alloy RPC clients.
//!
//! Every request runs inside an `rpc_call` span carrying the chain and method,
//! so transport-level logs line up with the monitor's own per-chain logs.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use alloy_chains::NamedChain;
use alloy_json_rpc::{RequestPacket, ResponsePacket};
use alloy_transport::TransportError;
use tower::Layer;
use tracing::{debug, trace, warn, Instrument};

/// A Tower layer that logs RPC requests for one chain's client.
///
/// # Example
///
/// ```rust,ignore
/// use alloy_chains::NamedChain;
/// use alloy_rpc_client::ClientBuilder;
/// use chainwatch::transport::LoggingLayer;
///
/// let client = ClientBuilder::default()
///     .layer(LoggingLayer::new(NamedChain::Base).with_slow_threshold(Duration::from_secs(2)))
///     .http(rpc_url);
/// ```
#[derive(Clone, Debug)]
pub struct LoggingLayer {
    chain: NamedChain,
    log_payloads: bool,
    slow_threshold: Option<Duration>,
}

impl LoggingLayer {
    /// Logs timing and errors only.
    pub fn new(chain: NamedChain) -> Self {
        Self {
            chain,
            log_payloads: false,
            slow_threshold: None,
        }
    }

    /// Also logs request and response payloads at `trace`.
    ///
    /// `eth_getLogs` responses can be large.
    pub fn with_payload_logging(mut self) -> Self {
        self.log_payloads = true;
        self
    }

    /// Logs requests slower than `threshold` at `warn`.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        LoggingService {
            service,
            chain: self.chain,
            log_payloads: self.log_payloads,
            slow_threshold: self.slow_threshold,
        }
    }
}

/// Service produced by [`LoggingLayer`].
#[derive(Clone, Debug)]
pub struct LoggingService<S> {
    service: S,
    chain: NamedChain,
    log_payloads: bool,
    slow_threshold: Option<Duration>,
}

impl<S> tower::Service<RequestPacket> for LoggingService<S>
where
    S: tower::Service<RequestPacket, Response = ResponsePacket, Error = TransportError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: RequestPacket) -> Self::Future {
        let log_payloads = self.log_payloads;
        let slow_threshold = self.slow_threshold;
        let mut service = self.service.clone();
        let method = method_label(&request);

        let span = tracing::debug_span!(
            "rpc_call",
            chain = %self.chain,
            method = %method,
        );

        Box::pin(
            async move {
                if log_payloads {
                    trace!(request = ?request, "RPC request");
                }
                let start = Instant::now();
                let result = service.call(request).await;
                let elapsed = start.elapsed();
                let duration_ms = elapsed.as_millis() as u64;

                match &result {
                    Ok(response) => {
                        if log_payloads {
                            trace!(response = ?response, duration_ms, "RPC response");
                        }
                        if slow_threshold.is_some_and(|threshold| elapsed > threshold) {
                            warn!(duration_ms, "Slow RPC response");
                        } else {
                            debug!(duration_ms, "RPC response");
                        }
                    }
                    Err(e) => warn!(error = %e, duration_ms, "RPC transport error"),
                }

                result
            }
            .instrument(span),
        )
    }
}

/// Method name for a single request, or a summary for a batch.
fn method_label(request: &RequestPacket) -> String {
    match request {
        RequestPacket::Single(req) => req.method().to_string(),
        RequestPacket::Batch(reqs) => match reqs.as_slice() {
            [] => "batch(empty)".to_string(),
            [only] => only.method().to_string(),
            many => format!("batch({} calls)", many.len()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_defaults() {
        let layer = LoggingLayer::new(NamedChain::Base);
        assert!(!layer.log_payloads);
        assert!(layer.slow_threshold.is_none());
    }

    #[test]
    fn test_layer_options() {
        let layer = LoggingLayer::new(NamedChain::Mainnet)
            .with_payload_logging()
            .with_slow_threshold(Duration::from_millis(750));
        assert!(layer.log_payloads);
        assert_eq!(layer.slow_threshold, Some(Duration::from_millis(750)));
    }
}
