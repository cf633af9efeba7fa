// [apps/controller/src/event_bus.rs]
/*!
 * =================================================================
 * APARATO: TOPIC EVENT BUS
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DIFUSIÓN DE SEÑALES POR TÓPICO CON COMODINES Y
 *                   AISLAMIENTO DE PÁNICOS POR SUSCRIPTOR
 *
 * Every subscriber gets its own unbounded mailbox and a dedicated task
 * that drains it sequentially — this is what gives per-topic FIFO
 * delivery *per subscriber* without forcing cross-topic ordering, and
 * what keeps one handler's panic from touching its siblings: the panic
 * is caught inside that subscriber's own drain loop, logged, and the
 * loop continues with the next mailbox entry.
 * =================================================================
 */

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aegis_domain_models::Event;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Ring buffer cap on published-event history. Matches the dispatch
/// contract: older events are dropped silently once this many have
/// accumulated.
const HISTORY_CAPACITY: usize = 1000;

#[derive(Clone)]
enum TopicPattern {
    Exact(String),
    Prefix(String),
    Any,
}

impl TopicPattern {
    fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            TopicPattern::Any
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            TopicPattern::Prefix(prefix.to_string())
        } else {
            TopicPattern::Exact(pattern.to_string())
        }
    }

    fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Any => true,
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Prefix(prefix) => {
                topic.starts_with(prefix.as_str())
                    && topic.as_bytes().get(prefix.len()) == Some(&b'.')
            }
        }
    }
}

struct Subscription {
    id: u64,
    pattern: TopicPattern,
    mailbox: mpsc::UnboundedSender<Event>,
    task: JoinHandle<()>,
}

/// Topic-addressed, wildcard-aware publish/subscribe bus. Handlers are
/// plain closures; the bus owns the dispatch task per subscription.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    history: Mutex<std::collections::VecDeque<Event>>,
    next_subscription_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: RwLock::new(Vec::new()),
            history: Mutex::new(std::collections::VecDeque::with_capacity(HISTORY_CAPACITY)),
            next_subscription_id: AtomicU64::new(1),
        })
    }

    /// Registers `handler` against `topic_pattern` (exact, `prefix.*`, or
    /// `*`). Returns a subscription id usable with [`EventBus::unsubscribe`].
    pub async fn subscribe<F>(&self, topic_pattern: &str, handler: F) -> u64
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let handler = Arc::new(handler);
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let handler = Arc::clone(&handler);
                let topic = event.topic.clone();
                let outcome = AssertUnwindSafe(async { handler(event) })
                    .catch_unwind()
                    .await;
                if outcome.is_err() {
                    error!(topic = %topic, "event handler panicked; isolated, continuing");
                }
            }
        });

        self.subscriptions.write().await.push(Subscription {
            id,
            pattern: TopicPattern::parse(topic_pattern),
            mailbox: tx,
            task,
        });

        id
    }

    pub async fn unsubscribe(&self, id: u64) {
        let mut subs = self.subscriptions.write().await;
        if let Some(pos) = subs.iter().position(|s| s.id == id) {
            let removed = subs.remove(pos);
            removed.task.abort();
        }
    }

    /// Dispatches `event` to every subscription whose pattern matches its
    /// topic, then records it in the bounded history ring buffer. Returns
    /// the number of subscribers it was delivered to.
    pub async fn publish(&self, event: Event) -> usize {
        let topic = event.topic.clone();
        let subs = self.subscriptions.read().await;
        let mut delivered = 0usize;
        for sub in subs.iter() {
            if sub.pattern.matches(&topic) {
                if sub.mailbox.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    warn!(topic = %topic, "subscriber mailbox closed, dropping delivery");
                }
            }
        }
        drop(subs);

        if delivered == 0 {
            trace!(topic = %topic, "event published with no subscribers");
        } else {
            trace!(topic = %topic, delivered, "event dispatched");
        }

        let mut history = self.history.lock().await;
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(event);

        delivered
    }

    /// Bounded history query. `topic_filter` follows the same pattern
    /// syntax as [`EventBus::subscribe`]; `None` returns everything.
    pub async fn recent(&self, topic_filter: Option<&str>, limit: usize) -> Vec<Event> {
        let pattern = topic_filter.map(TopicPattern::parse);
        let history = self.history.lock().await;
        history
            .iter()
            .rev()
            .filter(|event| pattern.as_ref().map_or(true, |p| p.matches(&event.topic)))
            .take(limit)
            .cloned()
            .rev()
            .collect()
    }

    /// Drains in-flight subscriber mailboxes with a short deadline, then
    /// forcibly aborts whatever remains.
    pub async fn shutdown(&self) {
        let mut subs = self.subscriptions.write().await;
        let drained = std::mem::take(&mut *subs);
        drop(subs);

        for sub in &drained {
            drop(sub.mailbox.clone());
        }

        let deadline = Duration::from_secs(2);
        for sub in drained {
            drop(sub.mailbox);
            if tokio::time::timeout(deadline, sub.task).await.is_err() {
                debug!(subscription_id = sub.id, "subscriber task exceeded shutdown deadline");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        // `EventBus::new` returns `Arc<Self>`; `Default` exists for call
        // sites that construct it through a generic `T::default()` bound
        // and then wrap it themselves.
        Self {
            subscriptions: RwLock::new(Vec::new()),
            history: Mutex::new(std::collections::VecDeque::with_capacity(HISTORY_CAPACITY)),
            next_subscription_id: AtomicU64::new(1),
        }
    }
}
