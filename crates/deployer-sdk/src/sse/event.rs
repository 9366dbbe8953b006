use casper_types::{EraId, ProtocolVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents an event received from the Casper SSE (Server-Sent Events) stream.
///
/// Only the fields needed to follow a deploy are typed; other payloads are kept as raw JSON so
/// that changes in their shape across node versions do not break decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SseEvent {
    ApiVersion(ProtocolVersion),
    DeployAccepted(Value),
    BlockAdded(Value),
    DeployProcessed(Value),
    DeployExpired(Value),
    TransactionAccepted(Value),
    TransactionProcessed(Value),
    TransactionExpired(Value),
    Fault(Value),
    Step {
        era_id: EraId,
        // Can be tens of megabytes, kept raw.
        execution_effects: Box<serde_json::value::RawValue>,
    },
    Shutdown,
    FinalitySignature(Value),
}

impl SseEvent {
    /// Hex hash of the deploy this event reports as processed, if it is such an event.
    pub fn processed_deploy_hash(&self) -> Option<&str> {
        match self {
            SseEvent::DeployProcessed(payload) => payload.get("deploy_hash")?.as_str(),
            SseEvent::TransactionProcessed(payload) => {
                payload.get("transaction_hash")?.get("Deploy")?.as_str()
            }
            _ => None,
        }
    }

    /// Payload of a processed event.
    pub fn into_processed_payload(self) -> Option<Value> {
        match self {
            SseEvent::DeployProcessed(payload) | SseEvent::TransactionProcessed(payload) => {
                Some(payload)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_deploy_processed() {
        let raw = r#"{"DeployProcessed":{"deploy_hash":"ab","execution_result":{"Success":{}}}}"#;
        let event: SseEvent = serde_json::from_str(raw).expect("should decode");
        assert_eq!(event.processed_deploy_hash(), Some("ab"));
        assert!(event.into_processed_payload().is_some());
    }

    #[test]
    fn test_decode_transaction_processed_for_deploy() {
        let raw = r#"{"TransactionProcessed":{"transaction_hash":{"Deploy":"cd"},"execution_result":{"Version2":{"error_message":null}}}}"#;
        let event: SseEvent = serde_json::from_str(raw).expect("should decode");
        assert_eq!(event.processed_deploy_hash(), Some("cd"));
    }

    #[test]
    fn test_transaction_processed_for_v1_has_no_deploy_hash() {
        let raw = r#"{"TransactionProcessed":{"transaction_hash":{"Version1":"ef"}}}"#;
        let event: SseEvent = serde_json::from_str(raw).expect("should decode");
        assert_eq!(event.processed_deploy_hash(), None);
    }

    #[test]
    fn test_decode_api_version_and_shutdown() {
        let event: SseEvent =
            serde_json::from_str(r#"{"ApiVersion":"2.0.0"}"#).expect("should decode");
        assert!(matches!(event, SseEvent::ApiVersion(_)));
        assert_eq!(event.processed_deploy_hash(), None);

        let event: SseEvent = serde_json::from_str(r#""Shutdown""#).expect("should decode");
        assert!(matches!(event, SseEvent::Shutdown));
    }
}
