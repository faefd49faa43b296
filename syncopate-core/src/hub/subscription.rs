use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use crossbeam::atomic::AtomicCell;
use futures_util::Stream;
use parking_lot::Mutex;

use crate::{Id, Member, RoomEvent};

use super::SubscriberHub;

pub type SubscriptionId = Id<Subscription>;

/// A single connection's presence in a room.
pub struct Subscription {
    pub id: SubscriptionId,
    pub member: Member,

    pending: Arc<Mutex<VecDeque<RoomEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
    last_seen: Arc<AtomicCell<Instant>>,
    closed: Arc<AtomicCell<bool>>,
}

/// The consuming side of a subscription.
///
/// Implements [Stream] over the room's events, and removes the subscription
/// from the hub when dropped.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    code: String,

    pending: Arc<Mutex<VecDeque<RoomEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
    closed: Arc<AtomicCell<bool>>,

    hub: Weak<SubscriberHub>,
}

impl Subscription {
    pub fn new(member: Member) -> Self {
        Self {
            id: SubscriptionId::new(),
            member,
            pending: Default::default(),
            waker: Default::default(),
            last_seen: Arc::new(AtomicCell::new(Instant::now())),
            closed: Arc::new(AtomicCell::new(false)),
        }
    }

    /// Queues an event for the consumer and wakes it.
    ///
    /// This never blocks on the consumer; a slow one just accumulates
    /// pending events until liveness eviction catches up with it.
    pub fn send(&self, event: RoomEvent) {
        self.pending.lock().push_back(event);
        self.wake();
    }

    /// Stamps the subscription as alive.
    pub fn heartbeat(&self) {
        self.last_seen.store(Instant::now());
    }

    /// How long ago the subscriber last signalled liveness.
    pub fn silent_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_seen.load())
    }

    /// Ends the stream on the consuming side.
    pub fn close(&self) {
        self.closed.store(true);
        self.wake();
    }

    pub fn handle(&self, code: String, hub: Weak<SubscriberHub>) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.id,
            code,
            pending: self.pending.clone(),
            waker: self.waker.clone(),
            closed: self.closed.clone(),
            hub,
        }
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn room_code(&self) -> &str {
        &self.code
    }
}

impl Stream for SubscriptionHandle {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pending.lock().pop_front() {
            return Poll::Ready(Some(event));
        }

        if self.closed.load() {
            return Poll::Ready(None);
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.code, self.id)
        }
    }
}
