//! Alloy transport integration
//!
//! - [`LoggingLayer`]: tower layer adding per-chain request logging to an alloy client
//! - [`classify_transport_error`]: maps alloy transport errors onto the
//!   transient/structural [`ProviderError`] taxonomy
//!
//! Retries and rate limiting are not done at the transport layer; every call
//! already passes through the chain's [`CallGate`](crate::gate::CallGate).

mod logging;

pub use logging::{LoggingLayer, LoggingService};

use alloy_json_rpc::RpcError;
use alloy_transport::{TransportError, TransportErrorKind};

use crate::errors::{ProviderError, RpcMethod};

/// JSON-RPC error codes providers use for throttling
const RATE_LIMIT_CODES: [i64; 2] = [429, -32005];
/// JSON-RPC "method not found"
const METHOD_NOT_FOUND: i64 = -32601;

/// Classifies an alloy transport error for `method`
///
/// Follows alloy's own `is_retry_err` judgement, then refines transient
/// failures into rate limits, timeouts and connection errors.
pub fn classify_transport_error(method: RpcMethod, error: TransportError) -> ProviderError {
    match &error {
        RpcError::Transport(kind) => classify_kind(method, kind, &error),

        RpcError::ErrorResp(payload) => {
            let details = format!("{} (code {})", payload.message, payload.code);
            if RATE_LIMIT_CODES.contains(&payload.code) || looks_rate_limited(&payload.message) {
                ProviderError::rate_limited(details)
            } else if payload.code == METHOD_NOT_FOUND {
                ProviderError::UnsupportedMethod { method }
            } else if payload.is_retry_err() {
                ProviderError::connection(details)
            } else {
                ProviderError::bad_request(details)
            }
        }

        // Malformed or empty responses are usually a struggling node.
        RpcError::DeserError { .. } | RpcError::NullResp => {
            ProviderError::connection(format!("bad response to {method}"))
        }

        // The request itself could not be built.
        _ => ProviderError::bad_request(error.to_string()),
    }
}

fn classify_kind(
    method: RpcMethod,
    kind: &TransportErrorKind,
    error: &TransportError,
) -> ProviderError {
    match kind {
        TransportErrorKind::HttpError(http) if http.status == 429 => {
            ProviderError::rate_limited(format!("HTTP 429: {}", http.body))
        }
        TransportErrorKind::PubsubUnavailable => ProviderError::UnsupportedMethod { method },
        TransportErrorKind::BackendGone => {
            ProviderError::connection(format!("transport backend gone during {method}"))
        }
        _ if kind.is_retry_err() => {
            let details = kind.to_string();
            if details.to_ascii_lowercase().contains("timed out") {
                ProviderError::timeout(details)
            } else if looks_rate_limited(&details) {
                ProviderError::rate_limited(details)
            } else {
                ProviderError::connection_with_source(details, clone_message(error))
            }
        }
        _ => ProviderError::bad_request(kind.to_string()),
    }
}

fn looks_rate_limited(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("rate limit") || message.contains("too many requests")
}

/// Transport errors are not `Clone`; keep the rendered message as the source.
fn clone_message(error: &TransportError) -> std::io::Error {
    std::io::Error::other(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::ErrorPayload;

    fn error_resp(code: i64, message: &'static str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn test_rate_limit_codes() {
        let err = classify_transport_error(
            RpcMethod::WalletActivity,
            error_resp(-32005, "limit exceeded"),
        );
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let err = classify_transport_error(
            RpcMethod::WalletActivity,
            error_resp(-32000, "Too Many Requests"),
        );
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[test]
    fn test_method_not_found_is_unsupported() {
        let err = classify_transport_error(
            RpcMethod::SubscribeNewBlocks,
            error_resp(-32601, "the method eth_subscribe does not exist"),
        );
        assert!(matches!(
            err,
            ProviderError::UnsupportedMethod {
                method: RpcMethod::SubscribeNewBlocks
            }
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_invalid_params_is_structural() {
        let err = classify_transport_error(
            RpcMethod::WalletActivity,
            error_resp(-32602, "invalid params"),
        );
        assert!(matches!(err, ProviderError::BadRequest { .. }));
    }

    #[test]
    fn test_transport_kinds() {
        let err = classify_transport_error(
            RpcMethod::LatestBlockNumber,
            TransportErrorKind::backend_gone(),
        );
        assert!(err.is_transient());

        let err = classify_transport_error(
            RpcMethod::SubscribeNewBlocks,
            TransportErrorKind::pubsub_unavailable(),
        );
        assert!(matches!(err, ProviderError::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_null_response_is_transient() {
        let err = classify_transport_error(RpcMethod::LatestBlockNumber, RpcError::NullResp);
        assert!(err.is_transient());
    }
}
