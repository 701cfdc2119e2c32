//! The subscription registry.
//!
//! A `DashMap` registry keyed by subscription id, a secondary
//! per-connection index for transport-close cleanup, and broadcast channels
//! for fan-out. Ids are `Uuid` v4, and channels are keyed per
//! `(contract, path)` subject rather than global, so a subscriber on one
//! file never sees another file's traffic and cross-path ordering is never
//! implied.
//!
//! A file subscription's channel key is `(contract, hash, Some(name))`; a
//! directory subscription's is `(contract, hash, None)`. Every mutation
//! under a directory additionally publishes an aggregate `update` event to
//! that directory's channel, so a single `publish` call from the
//! DataServer fans out to both the file-level and directory-level
//! listeners.

use alloy_primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// The event a [`Notification`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    Write,
    Append,
    Delete,
    Update,
    Mkdir,
}

/// A fan-out message delivered to every listener on a subscription's subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subscription_id: Uuid,
    pub event: NotificationEvent,
    pub file: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Key identifying a subscription's subject: a bubble, the path hash inside
/// it, and — for file subscriptions only — the name component.
type Subject = (Address, String, Option<String>);

/// A registered subscription.
///
/// `signatory` is the *effective* signatory (post delegation substitution)
/// it was created under (SPEC_FULL §3 supplement), so that a later ACC
/// revocation check re-queries the correct address rather than the
/// delegate's.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub contract: Address,
    pub hash: String,
    pub name: Option<String>,
    pub signatory: Address,
    pub connection_id: Uuid,
}

impl Subscription {
    fn subject(&self) -> Subject {
        (self.contract, self.hash.clone(), self.name.clone())
    }

    fn parent_subject(&self) -> Option<Subject> {
        self.name.as_ref().map(|_| (self.contract, self.hash.clone(), None))
    }
}

/// The Guardian's subscription registry: owns subscription ids, the
/// per-connection index used to drop subscriptions on transport close, and
/// the broadcast channels subscribers read notifications from.
pub struct SubscriptionManager {
    subscriptions: DashMap<Uuid, Subscription>,
    by_connection: DashMap<Uuid, Vec<Uuid>>,
    channels: DashMap<Subject, broadcast::Sender<Notification>>,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    pub fn new() -> Self {
        SubscriptionManager {
            subscriptions: DashMap::new(),
            by_connection: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    fn channel_for(&self, subject: Subject) -> broadcast::Sender<Notification> {
        self.channels
            .entry(subject)
            .or_insert_with(|| broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Registers a new subscription under a caller-supplied `id` — the
    /// Guardian generates one `Uuid` per `subscribe` call and uses it both
    /// as the `DataServer::subscribe` handle and as this registry's key, so
    /// `unsubscribe` only ever has to know one id. Returns a receiver for
    /// notifications on the subscription's subject.
    pub fn subscribe(
        &self,
        id: Uuid,
        contract: Address,
        hash: String,
        name: Option<String>,
        signatory: Address,
        connection_id: Uuid,
    ) -> broadcast::Receiver<Notification> {
        let subscription = Subscription {
            id,
            contract,
            hash,
            name,
            signatory,
            connection_id,
        };
        let receiver = self.channel_for(subscription.subject()).subscribe();
        self.subscriptions.insert(id, subscription);
        self.by_connection.entry(connection_id).or_default().push(id);
        receiver
    }

    /// Removes a subscription. Idempotent: removing an unknown or
    /// already-removed id is not an error.
    pub fn unsubscribe(&self, id: Uuid) {
        if let Some((_, subscription)) = self.subscriptions.remove(&id) {
            if let Some(mut ids) = self.by_connection.get_mut(&subscription.connection_id) {
                ids.retain(|existing| *existing != id);
            }
        }
    }

    /// Drops every subscription owned by `connection_id` — called when the
    /// transport closes.
    pub fn drop_connection(&self, connection_id: Uuid) {
        if let Some((_, ids)) = self.by_connection.remove(&connection_id) {
            for id in ids {
                self.subscriptions.remove(&id);
            }
        }
    }

    /// Closes a subscription in response to ACC permission revocation,
    /// publishing a final notification tagged `event: delete` is not done
    /// here — callers that detect revocation during fan-out should instead
    /// surface `SUBSCRIPTION_TERMINATED` to the transport and then call this.
    pub fn revoke(&self, id: Uuid) {
        self.unsubscribe(id);
    }

    pub fn get(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions.get(&id).map(|entry| entry.clone())
    }

    /// Publishes a notification for a mutation at `(contract, hash, name)`.
    /// The file-level channel (if any) receives `notification` directly.
    /// Every subscriber on the enclosing directory additionally receives an
    /// `update` aggregate naming the change, unless `notification.event` is
    /// already `Update` (directory-to-directory publication never nests).
    pub fn publish(&self, contract: Address, hash: &str, name: Option<&str>, notification: Notification) {
        let subject: Subject = (contract, hash.to_string(), name.map(|n| n.to_string()));
        if let Some(sender) = self.channels.get(&subject) {
            let _ = sender.send(notification.clone());
        }
        if name.is_some() && notification.event != NotificationEvent::Update {
            let parent: Subject = (contract, hash.to_string(), None);
            if let Some(sender) = self.channels.get(&parent) {
                let update = Notification {
                    subscription_id: notification.subscription_id,
                    event: NotificationEvent::Update,
                    file: Value::Array(vec![annotate_with_event(&notification)]),
                    data: None,
                };
                let _ = sender.send(update);
            }
        }
    }

    pub fn subscriber_count(&self, subscription: &Subscription) -> usize {
        self.channels
            .get(&subscription.subject())
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}

fn annotate_with_event(notification: &Notification) -> Value {
    let mut child = notification.file.clone();
    if let Value::Object(ref mut map) = child {
        map.insert(
            "event".to_string(),
            serde_json::to_value(notification.event).unwrap_or(Value::Null),
        );
    }
    child
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
