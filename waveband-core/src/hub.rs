use std::{
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
    time::Duration,
};

use log::debug;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::sleep,
};

use crate::{
    clock::Clock, events::RadioEvent, util::normalize_username, RadioContext, Store,
};

/// Frames a slow subscriber may buffer before new ones are dropped for it
const OUTBOX_CAPACITY: usize = 32;

static SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// One framed message on the push channel
#[derive(Debug, Clone)]
pub struct Frame {
    pub name: &'static str,
    pub data: serde_json::Value,
}

#[derive(Serialize)]
struct FramedEvent<'a> {
    ts: u64,
    #[serde(flatten)]
    event: &'a RadioEvent,
}

impl Frame {
    fn hello(username: &str) -> Self {
        Self {
            name: "hello",
            data: serde_json::json!({ "ok": true, "username": username }),
        }
    }

    fn ping(ts: u64) -> Self {
        Self {
            name: "ping",
            data: serde_json::json!({ "ts": ts }),
        }
    }

    fn radio(ts: u64, event: &RadioEvent) -> Self {
        Self {
            name: "radio",
            data: serde_json::to_value(FramedEvent { ts, event }).expect("event serializes"),
        }
    }
}

#[derive(Debug)]
pub struct PushSubscriber {
    id: u64,
    sender: mpsc::Sender<Frame>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The user already holds the maximum number of open subscriptions
    #[error("rate_limited")]
    UserLimit,
    /// The client address already holds the maximum number of open subscriptions
    #[error("rate_limited")]
    IpLimit,
}

/// Fans events out to every open push subscription of a user.
///
/// Each subscriber is a bounded outbound channel with its own writer on the
/// transport side; sends never block, and a full outbox drops the frame for
/// that subscriber only.
#[derive(Clone)]
pub struct PushHub {
    context: RadioContext,
}

impl PushHub {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Registers a subscription, enforcing the per-user cap before the
    /// per-address cap. The returned handle unsubscribes on drop.
    pub fn subscribe(&self, username: &str, ip: &str) -> Result<Subscription, HubError> {
        let username = normalize_username(username);
        let config = &self.context.config;

        let mut subscribers = self
            .context
            .subscribers
            .entry(username.clone())
            .or_default();

        if subscribers.len() >= config.max_sse_per_user {
            return Err(HubError::UserLimit);
        }

        {
            let mut count = self.context.ip_counts.entry(ip.to_string()).or_insert(0);

            if *count >= config.max_sse_per_ip {
                drop(count);
                let emptied = subscribers.is_empty();
                drop(subscribers);

                if emptied {
                    self.context
                        .subscribers
                        .remove_if(&username, |_, subscribers| subscribers.is_empty());
                }
                self.context.ip_counts.remove_if(ip, |_, count| *count == 0);

                return Err(HubError::IpLimit);
            }

            *count += 1;
        }

        let (sender, receiver) = mpsc::channel(OUTBOX_CAPACITY);
        let id = SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);

        // The greeting is always the first frame a subscriber sees
        let _ = sender.try_send(Frame::hello(&username));

        subscribers.push(PushSubscriber {
            id,
            sender: sender.clone(),
        });
        drop(subscribers);

        spawn_heartbeat_task(
            sender,
            self.context.config.push_heartbeat_ms,
            self.context.clock.clone(),
        );

        Ok(Subscription {
            username,
            ip: ip.to_string(),
            id,
            receiver,
            subscribers: self.context.subscribers.clone(),
            ip_counts: self.context.ip_counts.clone(),
        })
    }

    /// Sends an event to every open subscription of a user, best-effort.
    ///
    /// Returns whether any subscriber was there to receive it.
    pub fn push(&self, username: &str, event: &RadioEvent) -> bool {
        let username = normalize_username(username);

        let Some(subscribers) = self.context.subscribers.get(&username) else {
            return false;
        };

        if subscribers.is_empty() {
            return false;
        }

        let frame = Frame::radio(self.context.clock.now_ms(), event);

        for subscriber in subscribers.iter() {
            if subscriber.sender.try_send(frame.clone()).is_err() {
                debug!(
                    "Dropped {} frame for slow subscriber #{}",
                    frame.name, subscriber.id
                );
            }
        }

        true
    }

    pub fn subscriber_count(&self, username: &str) -> usize {
        self.context
            .subscribers
            .get(&normalize_username(username))
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

fn spawn_heartbeat_task(sender: mpsc::Sender<Frame>, period_ms: u64, clock: std::sync::Arc<dyn Clock>) {
    tokio::spawn(async move {
        loop {
            sleep(Duration::from_millis(period_ms)).await;

            match sender.try_send(Frame::ping(clock.now_ms())) {
                Err(TrySendError::Closed(_)) => break,
                // A full outbox just skips this beat
                _ => {}
            }
        }
    });
}

/// An open push subscription. Membership and the per-address count are
/// released when this is dropped.
#[derive(Debug)]
pub struct Subscription {
    username: String,
    ip: String,
    id: u64,
    receiver: mpsc::Receiver<Frame>,
    subscribers: Store<String, Vec<PushSubscriber>>,
    ip_counts: Store<String, usize>,
}

impl Subscription {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn poll_frame(&mut self, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.receiver.poll_recv(cx)
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mut subscribers) = self.subscribers.get_mut(&self.username) {
            subscribers.retain(|s| s.id != self.id);
            let emptied = subscribers.is_empty();
            drop(subscribers);

            if emptied {
                self.subscribers
                    .remove_if(&self.username, |_, subscribers| subscribers.is_empty());
            }
        }

        if let Some(mut count) = self.ip_counts.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            let emptied = *count == 0;
            drop(count);

            if emptied {
                self.ip_counts.remove_if(&self.ip, |_, count| *count == 0);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::HubError;
    use crate::{clock::ManualClock, events::RadioEvent, Radio, RadioConfig};

    fn hub_radio() -> Radio {
        let clock = Arc::new(ManualClock::new(1_000_000));
        Radio::with_clock(RadioConfig::default(), clock)
    }

    #[tokio::test]
    async fn hello_is_the_first_frame() {
        let radio = hub_radio();

        let mut subscription = radio.hub.subscribe("Alice", "10.0.0.1").unwrap();
        let frame = subscription.recv().await.unwrap();

        assert_eq!(frame.name, "hello");
        assert_eq!(frame.data["username"], "alice");
        assert_eq!(frame.data["ok"], true);
    }

    #[tokio::test]
    async fn push_reaches_every_subscriber() {
        let radio = hub_radio();

        let mut first = radio.hub.subscribe("alice", "10.0.0.1").unwrap();
        let mut second = radio.hub.subscribe("alice", "10.0.0.2").unwrap();

        assert!(radio.hub.push("alice", &RadioEvent::mute(true)));

        for subscription in [&mut first, &mut second] {
            let hello = subscription.recv().await.unwrap();
            assert_eq!(hello.name, "hello");

            let frame = subscription.recv().await.unwrap();
            assert_eq!(frame.name, "radio");
            assert_eq!(frame.data["type"], "RADIO_MUTE");
            assert_eq!(frame.data["muted"], true);
        }
    }

    #[tokio::test]
    async fn push_without_subscribers_reports_nobody() {
        let radio = hub_radio();

        assert!(!radio.hub.push("alice", &RadioEvent::RadioJoin));
    }

    #[tokio::test]
    async fn per_user_cap_enforced() {
        let radio = hub_radio();

        let _a = radio.hub.subscribe("alice", "10.0.0.1").unwrap();
        let _b = radio.hub.subscribe("alice", "10.0.0.2").unwrap();
        let _c = radio.hub.subscribe("alice", "10.0.0.3").unwrap();

        assert_eq!(
            radio.hub.subscribe("alice", "10.0.0.4").unwrap_err(),
            HubError::UserLimit
        );

        // Another user is unaffected
        assert!(radio.hub.subscribe("bob", "10.0.0.4").is_ok());
    }

    #[tokio::test]
    async fn per_ip_cap_enforced() {
        let radio = hub_radio();

        let mut held = Vec::new();
        for i in 0..10 {
            held.push(radio.hub.subscribe(&format!("user{i}"), "10.0.0.1").unwrap());
        }

        assert_eq!(
            radio.hub.subscribe("user10", "10.0.0.1").unwrap_err(),
            HubError::IpLimit
        );
    }

    #[tokio::test]
    async fn drop_releases_membership_and_address_slot() {
        let radio = hub_radio();

        let subscription = radio.hub.subscribe("alice", "10.0.0.1").unwrap();
        assert_eq!(radio.hub.subscriber_count("alice"), 1);

        drop(subscription);
        assert_eq!(radio.hub.subscriber_count("alice"), 0);

        // The freed address slot is usable again
        let mut held = Vec::new();
        for i in 0..10 {
            held.push(radio.hub.subscribe(&format!("user{i}"), "10.0.0.1").unwrap());
        }
        assert!(radio.hub.subscribe("user10", "10.0.0.1").is_err());
    }
}
