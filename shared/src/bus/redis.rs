//! Redis pub/sub message bus.
//!
//! Subjects map to channels `<prefix><subject>`. Patterns become `PSUBSCRIBE`
//! globs (`*` and `>` both turn into `*`), and every delivery is then checked
//! with the exact token matcher since a Redis `*` also spans dots.
//!
//! Redis has no queue groups. Each published frame carries a unique id, and a
//! queue subscriber only delivers a frame after winning a `SET NX EX` claim on
//! `<prefix>qg:<group>:<id>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_redis::RedisClient;
use bridge_types::BusMessage;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    subject_matches, validate_pattern, validate_subject, BusError, MessageBus, Subscription,
    SubscriptionCloser, SUBSCRIPTION_CAPACITY,
};

const CLAIM_TTL_SECS: u64 = 60;

#[derive(Serialize, Deserialize)]
struct Frame {
    id: String,
    message: BusMessage,
}

#[derive(Clone)]
pub struct RedisBus {
    client: RedisClient,
    prefix: String,
    next_id: Arc<AtomicU64>,
    closers: Arc<Closers>,
}

#[derive(Default)]
struct Closers {
    tokens: Mutex<HashMap<u64, CancellationToken>>,
}

impl SubscriptionCloser for Closers {
    fn close(&self, id: u64) {
        let token = self.tokens.lock().ok().and_then(|mut t| t.remove(&id));
        if let Some(token) = token {
            token.cancel();
        }
    }
}

impl RedisBus {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, BusError> {
        let client = RedisClient::connect(url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        client
            .ping()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self::with_client(client, prefix))
    }

    pub fn with_client(client: RedisClient, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
            next_id: Arc::new(AtomicU64::new(0)),
            closers: Arc::new(Closers::default()),
        }
    }

    async fn add(&self, pattern: &str, group: Option<&str>) -> Result<Subscription, BusError> {
        validate_pattern(pattern)?;

        let glob = format!("{}{}", escape_glob(&self.prefix), pattern_to_glob(pattern));
        let mut pubsub = self
            .client
            .pubsub()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        pubsub
            .psubscribe(&glob)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        if let Ok(mut tokens) = self.closers.tokens.lock() {
            tokens.insert(id, cancel.clone());
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let context = Delivery {
            client: self.client.clone(),
            prefix: self.prefix.clone(),
            pattern: pattern.to_string(),
            group: group.map(str::to_string),
            sender,
        };

        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = messages.next() => match next {
                        Some(msg) => {
                            if !context.deliver(msg).await {
                                break;
                            }
                        }
                        None => {
                            tracing::warn!(pattern = %context.pattern, "Redis pub/sub stream ended");
                            break;
                        }
                    },
                }
            }
        });

        let closer: Arc<dyn SubscriptionCloser> = self.closers.clone();
        Ok(Subscription::new(id, pattern, receiver, closer))
    }
}

struct Delivery {
    client: RedisClient,
    prefix: String,
    pattern: String,
    group: Option<String>,
    sender: mpsc::Sender<BusMessage>,
}

impl Delivery {
    /// Returns false once the receiving side is gone.
    async fn deliver(&self, msg: bridge_redis::Msg) -> bool {
        let channel = msg.get_channel_name();
        let Some(subject) = channel.strip_prefix(self.prefix.as_str()) else {
            return true;
        };
        if !subject_matches(&self.pattern, subject) {
            return true;
        }

        let payload: Vec<u8> = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Unreadable Redis payload");
                return true;
            }
        };
        let frame: Frame = match serde_json::from_slice(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Malformed bus frame");
                return true;
            }
        };

        if let Some(group) = &self.group {
            let claim_key = format!("{}qg:{}:{}", self.prefix, group, frame.id);
            match self.client.set_nx_ex(&claim_key, "1", CLAIM_TTL_SECS).await {
                Ok(true) => {}
                Ok(false) => return true,
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "Queue group claim failed");
                    return true;
                }
            }
        }

        match self.sender.try_send(frame.message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subject = %subject, "Slow consumer, dropping message");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        validate_subject(&message.subject)?;
        let channel = format!("{}{}", self.prefix, message.subject);
        let frame = Frame {
            id: Uuid::new_v4().simple().to_string(),
            message,
        };
        let payload = serde_json::to_vec(&frame)?;
        self.client
            .publish(&channel, &payload)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        self.add(pattern, None).await
    }

    async fn queue_subscribe(&self, pattern: &str, group: &str) -> Result<Subscription, BusError> {
        self.add(pattern, Some(group)).await
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn pattern_to_glob(pattern: &str) -> String {
    pattern
        .split('.')
        .map(|token| match token {
            "*" | ">" => "*".to_string(),
            literal => escape_glob(literal),
        })
        .collect::<Vec<_>>()
        .join(".")
}
