//! Registry of live subscriber connections
//!
//! Each subscriber owns one entry holding its outbound channel and its last
//! reported location. Both live in the same map under one lock, so removing a
//! subscriber always drops channel and location together.
//!
//! Sends never happen while the lock is held. [`SubscriberRegistry::broadcast`]
//! snapshots the senders, delivers outside the lock with every send bounded by
//! the configured timeout, and re-locks only to prune subscribers whose
//! delivery failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::errors::SightingError;
use crate::models::{Coordinate, KnownLocation, ServerMessage, SubscriberId};

/// Outbound half of a subscriber channel
pub type SubscriberSender = mpsc::Sender<ServerMessage>;

/// Identifies one particular connection of a subscriber
///
/// A subscriber id may reconnect; the generation tells the connections apart
/// so a closing connection only removes its own registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: SubscriberId,
    generation: u64,
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of subscribers the message was handed to
    pub delivered: usize,
    /// Subscribers whose delivery failed and that have been removed
    pub pruned: Vec<SubscriberId>,
}

#[derive(Debug)]
struct Subscriber {
    sender: SubscriberSender,
    generation: u64,
    location: Option<KnownLocation>,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    next_generation: AtomicU64,
    send_timeout: Duration,
}

enum DeliveryError {
    Closed,
    TimedOut,
}

impl SubscriberRegistry {
    /// Create an empty registry
    ///
    /// `send_timeout` bounds every single delivery; a subscriber that cannot
    /// accept a message within it is treated as dead.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            send_timeout,
        }
    }

    /// Register a subscriber, replacing any previous registration of `id`
    ///
    /// The replaced channel is dropped, which closes it for its receiver.
    pub async fn connect(&self, id: SubscriberId, sender: SubscriberSender) -> ConnectionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber {
            sender,
            generation,
            location: None,
        };

        let (replaced, total) = {
            let mut subscribers = self.subscribers.lock().await;
            let replaced = subscribers.insert(id.clone(), subscriber);
            (replaced, subscribers.len())
        };

        if replaced.is_some() {
            info!("Subscriber {} reconnected, previous connection closed", id);
        } else {
            info!("Subscriber {} connected, {} active", id, total);
        }

        ConnectionHandle { id, generation }
    }

    /// Remove a subscriber; unknown ids are ignored
    pub async fn disconnect(&self, id: &SubscriberId) {
        let removed = self.subscribers.lock().await.remove(id);
        if removed.is_some() {
            info!("Subscriber {} disconnected", id);
        }
    }

    /// Remove the registration made by `handle`, if it is still current
    pub async fn release(&self, handle: &ConnectionHandle) {
        if self.remove_generation(&handle.id, handle.generation).await {
            info!("Subscriber {} disconnected", handle.id);
        } else {
            debug!(
                "Connection {} of subscriber {} already superseded",
                handle.generation, handle.id
            );
        }
    }

    /// Record the current location of a connected subscriber
    pub async fn update_location(
        &self,
        id: &SubscriberId,
        coordinate: Coordinate,
    ) -> Result<(), SightingError> {
        let mut subscribers = self.subscribers.lock().await;
        let subscriber = subscribers
            .get_mut(id)
            .ok_or_else(|| SightingError::UnknownSubscriber(id.to_string()))?;
        subscriber.location = Some(KnownLocation {
            coordinate,
            updated_at: Utc::now(),
        });
        debug!(
            "Location of {} updated to ({}, {})",
            id,
            coordinate.lat(),
            coordinate.lon()
        );
        Ok(())
    }

    /// Send a message to one subscriber
    ///
    /// A failed delivery removes the subscriber and reports `DeliveryFailure`.
    pub async fn send_to(
        &self,
        id: &SubscriberId,
        message: ServerMessage,
    ) -> Result<(), SightingError> {
        let (sender, generation) = {
            let subscribers = self.subscribers.lock().await;
            let subscriber = subscribers
                .get(id)
                .ok_or_else(|| SightingError::UnknownSubscriber(id.to_string()))?;
            (subscriber.sender.clone(), subscriber.generation)
        };

        match self.deliver(&sender, message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.log_delivery_failure(id, &e);
                self.remove_generation(id, generation).await;
                Err(SightingError::DeliveryFailure(id.to_string()))
            }
        }
    }

    /// Send a message to every connected subscriber
    ///
    /// Failures do not interrupt delivery to the others. Every subscriber
    /// whose delivery failed is pruned from the registry.
    pub async fn broadcast(&self, message: ServerMessage) -> BroadcastReport {
        let targets: Vec<(SubscriberId, u64, SubscriberSender)> = {
            let subscribers = self.subscribers.lock().await;
            subscribers
                .iter()
                .map(|(id, s)| (id.clone(), s.generation, s.sender.clone()))
                .collect()
        };

        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let outcomes = join_all(targets.iter().map(|(_, _, sender)| {
            let message = message.clone();
            async move { self.deliver(sender, message).await }
        }))
        .await;

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for ((id, generation, _), outcome) in targets.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.log_delivery_failure(&id, &e);
                    failed.push((id, generation));
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock().await;
            for (id, generation) in failed {
                if subscribers
                    .get(&id)
                    .is_some_and(|s| s.generation == generation)
                {
                    subscribers.remove(&id);
                    report.pruned.push(id);
                }
            }
        }

        debug!(
            "Broadcast delivered to {} subscribers, pruned {}",
            report.delivered,
            report.pruned.len()
        );
        report
    }

    /// Snapshot of the last known location of every subscriber that sent one
    pub async fn locations(&self) -> Vec<(SubscriberId, KnownLocation)> {
        let subscribers = self.subscribers.lock().await;
        subscribers
            .iter()
            .filter_map(|(id, s)| s.location.map(|location| (id.clone(), location)))
            .collect()
    }

    /// Time a single delivery may take
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Number of connected subscribers
    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.lock().await.contains_key(id)
    }

    async fn deliver(
        &self,
        sender: &SubscriberSender,
        message: ServerMessage,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.send_timeout, sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::TimedOut),
        }
    }

    fn log_delivery_failure(&self, id: &SubscriberId, error: &DeliveryError) {
        match error {
            DeliveryError::Closed => warn!("Subscriber {} channel closed, pruning", id),
            DeliveryError::TimedOut => warn!(
                "Subscriber {} did not accept message within {:?}, pruning",
                id, self.send_timeout
            ),
        }
    }

    async fn remove_generation(&self, id: &SubscriberId, generation: u64) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers
            .get(id)
            .is_some_and(|s| s.generation == generation)
        {
            subscribers.remove(id);
            true
        } else {
            false
        }
    }
}
