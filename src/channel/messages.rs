//! Messages the coordinator pushes to peer contexts
//!
//! Wire-shaped: peers on the far side of a transport deserialize these by
//! their `action` tag.

use serde::{Deserialize, Serialize};

/// Messages sent from the coordinator to a peer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Deliver a code to the consumer for filling.
    #[serde(rename_all = "camelCase")]
    FillCode {
        code: String,
        is_retry: bool,
        attempt: u32,
    },
    /// Ask the source to scan for the latest code now.
    RequestScan,
    /// Ask the source to watch for a code different from the failed one.
    #[serde(rename_all = "camelCase")]
    AwaitFreshCode { failed_code: String },
    /// Ask the source to close its contexts.
    CloseContexts,
}

impl OutboundMessage {
    /// Stamp the current attempt number onto a fill message. Identity for
    /// every other variant.
    pub fn with_attempt(self, n: u32) -> Self {
        match self {
            OutboundMessage::FillCode { code, is_retry, .. } => OutboundMessage::FillCode {
                code,
                is_retry,
                attempt: n,
            },
            other => other,
        }
    }
}

/// Acknowledgment returned by a peer for a delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_code_serializes_with_action_tag() {
        let msg = OutboundMessage::FillCode {
            code: "483920".to_string(),
            is_retry: false,
            attempt: 1,
        };
        let json = serde_json::to_value(&msg).expect("serializes");
        assert_eq!(json["action"], "fillCode");
        assert_eq!(json["code"], "483920");
        assert_eq!(json["isRetry"], false);
        assert_eq!(json["attempt"], 1);
    }

    #[test]
    fn await_fresh_code_round_trips() {
        let msg = OutboundMessage::AwaitFreshCode {
            failed_code: "111222".to_string(),
        };
        let json = serde_json::to_string(&msg).expect("serializes");
        let back: OutboundMessage = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, msg);
    }

    #[test]
    fn with_attempt_only_touches_fill() {
        let fill = OutboundMessage::FillCode {
            code: "483920".to_string(),
            is_retry: true,
            attempt: 0,
        };
        match fill.with_attempt(3) {
            OutboundMessage::FillCode { attempt, is_retry, .. } => {
                assert_eq!(attempt, 3);
                assert!(is_retry);
            }
            _ => panic!("wrong variant"),
        }
        assert_eq!(
            OutboundMessage::RequestScan.with_attempt(3),
            OutboundMessage::RequestScan
        );
    }
}
