//! Backend client collaborators.
//!
//! The engine talks to the telemetry/command backend only through these
//! traits. Implementations own transport, retries and authentication;
//! failures are passed back to the caller untouched.

use anyhow::Result;
use async_trait::async_trait;
use mdb_types::{Command, CommandHistoryEntry, NamedObjectId, ParameterData};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

/// Command-issue request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCommandRequest {
    /// Sequence number chosen by the caller; the stack runner uses the
    /// entry's execution number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub args: JsonMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCommandResponse {
    /// Dispatch id; matches `CommandHistoryEntry::id`
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
}

/// Options of a parameter subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOptions {
    pub send_from_cache: bool,
    pub update_on_expiration: bool,
    pub abort_on_invalid: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            send_from_cache: true,
            update_on_expiration: true,
            abort_on_invalid: false,
        }
    }
}

/// Command dispatch and mission-database lookups
#[async_trait]
pub trait CommandClient: Send + Sync {
    async fn issue_command(&self, command: &NamedObjectId, request: IssueCommandRequest) -> Result<IssueCommandResponse>;

    /// Command definition including its `baseCommand` chain
    async fn get_command(&self, qualified_name: &str) -> Result<Command>;
}

/// Push-based live parameter values
#[async_trait]
pub trait ParameterFeed: Send + Sync {
    async fn subscribe_parameters(
        &self,
        ids: &[NamedObjectId],
        options: SubscriptionOptions,
    ) -> Result<Subscription<ParameterData>>;
}

/// Push-based command-history updates
#[async_trait]
pub trait CommandHistoryFeed: Send + Sync {
    async fn subscribe_command_history(&self) -> Result<Subscription<CommandHistoryEntry>>;
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// Receiving end of a backend subscription.
///
/// Dropping or cancelling it notifies the producer, which must stop pushing.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Producer side handed to a `ParameterFeed` or `CommandHistoryFeed` implementation
#[derive(Debug)]
pub struct SubscriptionSink<T> {
    pub tx: mpsc::Sender<T>,
    pub cancelled: oneshot::Receiver<()>,
}

impl<T> Subscription<T> {
    /// Create a linked subscription/sink pair
    pub fn channel(buffer: usize) -> (Subscription<T>, SubscriptionSink<T>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        (
            Subscription {
                rx,
                cancel: Some(cancel_tx),
            },
            SubscriptionSink {
                tx,
                cancelled: cancel_rx,
            },
        )
    }

    /// Next push; `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_subscription_notifies_producer() {
        let (sub, mut sink) = Subscription::<u32>::channel(4);
        sink.tx.send(1).await.unwrap();
        drop(sub);
        assert!((&mut sink.cancelled).await.is_ok());
        assert!(sink.tx.send(2).await.is_err());
    }

    #[tokio::test]
    async fn cancel_stops_delivery() {
        let (mut sub, sink) = Subscription::<u32>::channel(4);
        sink.tx.send(7).await.unwrap();
        assert_eq!(sub.recv().await, Some(7));
        sub.cancel();
        assert!(sub.is_cancelled());
        assert!(sink.tx.send(8).await.is_err());
    }

    #[test]
    fn request_serializes_camel_case() {
        let request = IssueCommandRequest {
            sequence_number: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"sequenceNumber": 3}));
    }
}
