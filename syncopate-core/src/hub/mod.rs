mod subscription;

pub use subscription::*;

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::RoomEvent;

/// A listener in a room, as supplied by the room management layer.
///
/// Membership is a relation; the hub records it per subscription and never
/// owns any playback state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: u64,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Tracks which connections belong to which room and fans room events out
/// to them.
///
/// Broadcasts are best-effort and never block on a consumer; a connection
/// that stops signalling liveness is evicted instead.
pub struct SubscriberHub {
    me: Weak<Self>,
    rooms: DashMap<String, Vec<Subscription>>,
}

impl SubscriberHub {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            rooms: Default::default(),
        })
    }

    /// Adds a connection to a room and returns the consuming handle.
    pub fn subscribe(&self, code: &str, member: Member) -> SubscriptionHandle {
        let subscription = Subscription::new(member.clone());
        let handle = subscription.handle(code.to_string(), self.me.clone());

        self.rooms
            .entry(code.to_string())
            .or_default()
            .push(subscription);

        self.broadcast(code, RoomEvent::MemberJoined { member });
        handle
    }

    /// Removes a subscription. Called on handle drop and on eviction.
    pub fn unsubscribe(&self, code: &str, id: SubscriptionId) {
        let removed = self.remove(code, id);

        if let Some(subscription) = removed {
            subscription.close();

            self.broadcast(
                code,
                RoomEvent::MemberLeft {
                    member_id: subscription.member.id,
                },
            );
        }
    }

    /// Sends an event to every live subscriber of a room, in production order.
    pub fn broadcast(&self, code: &str, event: RoomEvent) {
        if let Some(subscriptions) = self.rooms.get(code) {
            for subscription in subscriptions.iter() {
                subscription.send(event.clone())
            }
        }
    }

    /// Sends an event to a single subscriber, used for initial sync.
    pub fn send(&self, code: &str, id: SubscriptionId, event: RoomEvent) {
        if let Some(subscriptions) = self.rooms.get(code) {
            if let Some(subscription) = subscriptions.iter().find(|s| s.id == id) {
                subscription.send(event)
            }
        }
    }

    /// Stamps a subscription as alive. Returns false for unknown ids.
    pub fn heartbeat(&self, code: &str, id: SubscriptionId) -> bool {
        self.rooms
            .get(code)
            .and_then(|subscriptions| {
                subscriptions
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| s.heartbeat())
            })
            .is_some()
    }

    pub fn subscriber_count(&self, code: &str) -> usize {
        self.rooms.get(code).map(|s| s.len()).unwrap_or_default()
    }

    pub fn members(&self, code: &str) -> Vec<Member> {
        self.rooms
            .get(code)
            .map(|subscriptions| subscriptions.iter().map(|s| s.member.clone()).collect())
            .unwrap_or_default()
    }

    /// Evicts every subscription that has been silent past the grace period.
    pub fn evict_stale(&self, grace: Duration) {
        let now = Instant::now();
        let mut stale = vec![];

        for room in self.rooms.iter() {
            for subscription in room.value().iter() {
                if subscription.silent_for(now) > grace {
                    stale.push((room.key().clone(), subscription.id));
                }
            }
        }

        for (code, id) in stale {
            info!("Evicting silent subscriber from room {}", code);
            self.unsubscribe(&code, id);
        }
    }

    /// Ends every subscription of a room. The room broadcasts its closing
    /// event before calling this.
    pub fn drop_room(&self, code: &str) {
        if let Some((_, subscriptions)) = self.rooms.remove(code) {
            for subscription in subscriptions {
                subscription.close();
            }
        }
    }

    fn remove(&self, code: &str, id: SubscriptionId) -> Option<Subscription> {
        let mut subscriptions = self.rooms.get_mut(code)?;

        let position = subscriptions.iter().position(|s| s.id == id)?;
        Some(subscriptions.remove(position))
    }
}

/// Periodically sweeps out subscribers that stopped signalling liveness.
pub fn spawn_keepalive_task(
    hub: Arc<SubscriberHub>,
    interval: Duration,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);

        loop {
            timer.tick().await;
            hub.evict_stale(grace);
        }
    })
}
