//! The typed, multi-subscriber channel owned by exactly one agent.
//!
//! A [`MessageStream`] is both the publish endpoint described in spec
//! §4.1 and the ordered mailbox described in §4.5: publishing enqueues an
//! envelope, and a single [`StreamDriver::run`] task drains the queue in
//! order, dispatching each envelope to every subscriber whose declared
//! payload type matches. Because exactly one task ever drains a given
//! stream, handlers for one agent never race each other.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gagent_types::{AgentId, Envelope, RuntimeError};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// A boxed, type-erased async handler invoked for every envelope whose
/// `type_url` matches the subscription it was registered under.
pub type HandlerFn = Arc<
    dyn Fn(Envelope) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send>>
        + Send
        + Sync,
>;

/// Opaque handle identifying one subscriber registration, returned by
/// [`MessageStream::subscribe`] so callers can later unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// One registered subscriber: a name (for logs), the payload type it
/// declared interest in, and the handler to invoke.
pub struct Subscription {
    id: SubscriptionId,
    /// Human-readable subscriber name, used in logs and handler-failure
    /// error messages.
    pub name: String,
    /// `type_url` this subscriber declared; envelopes of any other type
    /// are silently skipped for this subscriber.
    pub type_url: String,
    handler: HandlerFn,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_url", &self.type_url)
            .finish()
    }
}

enum Mailbox {
    Bounded(mpsc::Sender<Envelope>),
    Unbounded(mpsc::UnboundedSender<Envelope>),
}

impl Mailbox {
    fn try_send(&self, envelope: Envelope) -> Result<(), Envelope> {
        match self {
            Mailbox::Bounded(tx) => tx.try_send(envelope).map_err(|e| match e {
                mpsc::error::TrySendError::Full(env) => env,
                mpsc::error::TrySendError::Closed(env) => env,
            }),
            Mailbox::Unbounded(tx) => tx.send(envelope).map_err(|e| e.0),
        }
    }
}

enum MailboxReceiver {
    Bounded(mpsc::Receiver<Envelope>),
    Unbounded(mpsc::UnboundedReceiver<Envelope>),
}

impl MailboxReceiver {
    async fn recv(&mut self) -> Option<Envelope> {
        match self {
            MailboxReceiver::Bounded(rx) => rx.recv().await,
            MailboxReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// The publish-side handle to one agent's stream. Cheaply cloneable;
/// every clone shares the same underlying mailbox and subscriber list.
#[derive(Clone)]
pub struct MessageStream {
    agent_id: AgentId,
    mailbox: Arc<Mailbox>,
    subscribers: Arc<RwLock<Vec<Subscription>>>,
}

/// The consumer-side handle for one agent's stream. Exactly one task
/// should ever call [`StreamDriver::run`] for a given stream — that is
/// what gives the agent its single-writer guarantee.
pub struct StreamDriver {
    agent_id: AgentId,
    receiver: MailboxReceiver,
    subscribers: Arc<RwLock<Vec<Subscription>>>,
}

impl MessageStream {
    /// Create a new stream for `agent_id`. `capacity` of `None` means an
    /// unbounded queue (the spec's default); `Some(n)` makes `publish`
    /// fail with [`RuntimeError::Backpressure`] once `n` envelopes are
    /// queued and undelivered.
    pub fn new(agent_id: AgentId, capacity: Option<usize>) -> (Self, StreamDriver) {
        let (mailbox, receiver) = match capacity {
            Some(n) => {
                let (tx, rx) = mpsc::channel(n.max(1));
                (Mailbox::Bounded(tx), MailboxReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Mailbox::Unbounded(tx), MailboxReceiver::Unbounded(rx))
            }
        };
        let subscribers = Arc::new(RwLock::new(Vec::new()));
        let stream = MessageStream {
            agent_id,
            mailbox: Arc::new(mailbox),
            subscribers: subscribers.clone(),
        };
        let driver = StreamDriver {
            agent_id,
            receiver,
            subscribers,
        };
        (stream, driver)
    }

    /// The agent this stream belongs to.
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Enqueue an envelope for delivery. Returns immediately; delivery to
    /// subscribers happens as the driver drains the queue.
    pub fn publish(&self, envelope: Envelope) -> Result<(), RuntimeError> {
        self.mailbox.try_send(envelope).map_err(|_| RuntimeError::Backpressure {
            agent: self.agent_id,
        })
    }

    /// Register a subscriber for envelopes whose `type_url` equals
    /// `type_url`. Returns a handle usable with [`MessageStream::unsubscribe`].
    pub async fn subscribe(
        &self,
        name: impl Into<String>,
        type_url: impl Into<String>,
        handler: HandlerFn,
    ) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().await.push(Subscription {
            id,
            name: name.into(),
            type_url: type_url.into(),
            handler,
        });
        id
    }

    /// Remove a previously registered subscriber.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().await.retain(|s| s.id != id);
    }

    /// Current number of registered subscribers, regardless of declared
    /// type.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl PartialEq for SubscriptionId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for SubscriptionId {}

impl StreamDriver {
    /// Drain the mailbox until the publish side is dropped, dispatching
    /// each envelope, in arrival order, to every subscriber whose
    /// declared type matches. A subscriber's handler failure is isolated
    /// — logged and counted — and never prevents sibling subscribers
    /// from running or the loop from advancing to the next envelope.
    pub async fn run(mut self) {
        while let Some(envelope) = self.receiver.recv().await {
            self.dispatch(envelope).await;
        }
        debug!(agent = %self.agent_id, "stream driver exiting: mailbox closed");
    }

    /// Process exactly one envelope and return. Exposed so a caller that
    /// wants direct control over the drain loop (e.g. to interleave it
    /// with other agent bookkeeping) doesn't have to re-implement
    /// dispatch; [`Self::run`] is simply a loop around this.
    pub async fn recv_and_dispatch(&mut self) -> Option<Envelope> {
        let envelope = self.receiver.recv().await?;
        self.dispatch(envelope.clone()).await;
        Some(envelope)
    }

    async fn dispatch(&self, envelope: Envelope) {
        let subscribers = self.subscribers.read().await;
        for sub in subscribers.iter() {
            if sub.type_url != envelope.type_url {
                continue;
            }
            if let Err(err) = (sub.handler)(envelope.clone()).await {
                warn!(
                    agent = %self.agent_id,
                    subscriber = %sub.name,
                    envelope_id = %envelope.id,
                    error = %err,
                    "subscriber handler failed; isolated, mailbox continues"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gagent_types::Direction;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    fn test_envelope(type_url: &str) -> Envelope {
        Envelope::raised(
            AgentId::new(),
            type_url,
            vec![],
            Direction::Own,
            None,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn delivers_to_matching_subscriber_only() {
        let (stream, mut driver) = MessageStream::new(AgentId::new(), None);
        let hit = Arc::new(AtomicUsize::new(0));
        let hit2 = hit.clone();
        stream
            .subscribe(
                "counter",
                "type.googleapis.com/A",
                Arc::new(move |_env| {
                    let hit2 = hit2.clone();
                    Box::pin(async move {
                        hit2.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await;

        stream.publish(test_envelope("type.googleapis.com/A")).unwrap();
        stream.publish(test_envelope("type.googleapis.com/B")).unwrap();
        driver.recv_and_dispatch().await;
        driver.recv_and_dispatch().await;

        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_stream_reports_backpressure_when_full() {
        let (stream, _driver) = MessageStream::new(AgentId::new(), Some(1));
        stream.publish(test_envelope("type.googleapis.com/A")).unwrap();
        let err = stream.publish(test_envelope("type.googleapis.com/A")).unwrap_err();
        assert!(matches!(err, RuntimeError::Backpressure { .. }));
    }

    #[tokio::test]
    async fn one_handler_failing_does_not_block_sibling() {
        let (stream, mut driver) = MessageStream::new(AgentId::new(), None);
        let ok_hits = Arc::new(AtomicUsize::new(0));
        let ok_hits2 = ok_hits.clone();

        stream
            .subscribe(
                "failing",
                "type.googleapis.com/A",
                Arc::new(|_env| {
                    Box::pin(async move {
                        Err(RuntimeError::InvalidArgument {
                            reason: "boom".to_string(),
                        })
                    })
                }),
            )
            .await;
        stream
            .subscribe(
                "ok",
                "type.googleapis.com/A",
                Arc::new(move |_env| {
                    let ok_hits2 = ok_hits2.clone();
                    Box::pin(async move {
                        ok_hits2.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await;

        stream.publish(test_envelope("type.googleapis.com/A")).unwrap();
        driver.recv_and_dispatch().await;

        assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
    }
}
