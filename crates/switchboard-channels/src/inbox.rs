//! Ordered, buffered delivery of inbound messages to the active handler.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::{Notify, mpsc, watch};
use tracing::Instrument;

use switchboard_core::logging::Logger;
use switchboard_core::types::InboundMessage;

use crate::traits::MessageHandler;

type HandlerSlot = Option<Arc<dyn MessageHandler>>;

/// Inbound queue shared by channel implementations.
///
/// Transports [`push`](Inbox::push) messages as they observe them. A single
/// delivery task hands them to the current handler one at a time, so the
/// handler sees messages in push order. The queue is unbounded: a slow or
/// missing handler makes messages wait, never disappear.
///
/// The delivery task is spawned by [`start`](Inbox::start) and runs until the
/// inbox is dropped.
pub struct Inbox {
    queue: mpsc::UnboundedSender<InboundMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    handler: watch::Sender<HandlerSlot>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    logger: Mutex<Logger>,
}

impl Inbox {
    /// Create an idle inbox.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let (handler, _) = watch::channel(None);
        Self {
            queue,
            receiver: Mutex::new(Some(receiver)),
            handler,
            pending: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            logger: Mutex::new(logger),
        }
    }

    /// Replace the logger. Takes effect when the delivery task starts.
    pub fn set_logger(&self, logger: Logger) {
        *self.logger.lock().unwrap_or_else(PoisonError::into_inner) = logger;
    }

    /// Replace the active handler.
    pub fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handler.send_replace(Some(handler));
    }

    /// Whether a handler has been registered.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.borrow().is_some()
    }

    /// Spawn the delivery task. Later calls are no-ops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(receiver) = receiver {
            let logger = self
                .logger
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let span = logger.span().clone();
            let worker = deliver(
                receiver,
                self.handler.subscribe(),
                Arc::clone(&self.pending),
                Arc::clone(&self.drained),
                logger,
            );
            tokio::spawn(worker.instrument(span));
        }
    }

    /// Queue a message for delivery.
    pub fn push(&self, message: InboundMessage) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(message).is_err() {
            // Receiver only goes away with the inbox itself
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Messages queued or in the handler right now.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every queued message has been handled.
    pub async fn drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn deliver(
    mut receiver: mpsc::UnboundedReceiver<InboundMessage>,
    mut handler: watch::Receiver<HandlerSlot>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    logger: Logger,
) {
    while let Some(message) = receiver.recv().await {
        let current = {
            let Ok(slot) = handler.wait_for(Option::is_some).await else {
                break;
            };
            slot.clone()
        };

        if let Some(current) = current {
            let id = message.id.clone();
            let outcome = AssertUnwindSafe(current.handle(message)).catch_unwind().await;
            if outcome.is_err() {
                logger.in_scope(|| tracing::error!(message_id = %id, "message handler panicked"));
            }
        }

        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            drained.notify_waiters();
        }
    }

    logger.in_scope(|| tracing::debug!("inbox closed"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_message;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    fn recorder() -> (Arc<dyn MessageHandler>, Arc<AsyncMutex<Vec<String>>>) {
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn MessageHandler> = Arc::new(move |msg: InboundMessage| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(msg.id);
            }
        });
        (handler, seen)
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let inbox = Inbox::new(Logger::disabled());
        let (handler, seen) = recorder();
        inbox.set_handler(handler);
        inbox.start();

        for i in 0..20 {
            inbox.push(sample_message(&i.to_string()));
        }
        inbox.drained().await;

        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(*seen.lock().await, expected);
        assert_eq!(inbox.pending(), 0);
    }

    #[tokio::test]
    async fn test_buffers_until_handler_registered() {
        let inbox = Inbox::new(Logger::disabled());
        inbox.start();

        inbox.push(sample_message("a"));
        inbox.push(sample_message("b"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(inbox.pending(), 2);
        assert!(!inbox.has_handler());

        let (handler, seen) = recorder();
        inbox.set_handler(handler);
        inbox.drained().await;

        assert_eq!(*seen.lock().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_slow_handler_drops_nothing() {
        let inbox = Inbox::new(Logger::disabled());
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        inbox.set_handler(Arc::new(move |msg: InboundMessage| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                sink.lock().await.push(msg.id);
            }
        }));
        inbox.start();

        for i in 0..10 {
            inbox.push(sample_message(&i.to_string()));
        }
        inbox.drained().await;

        assert_eq!(seen.lock().await.len(), 10);
    }

    #[tokio::test]
    async fn test_last_registered_handler_wins() {
        let inbox = Inbox::new(Logger::disabled());
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        inbox.start();

        inbox.set_handler(first);
        inbox.push(sample_message("1"));
        inbox.drained().await;

        inbox.set_handler(second);
        inbox.push(sample_message("2"));
        inbox.drained().await;

        assert_eq!(*first_seen.lock().await, vec!["1".to_string()]);
        assert_eq!(*second_seen.lock().await, vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_delivery() {
        let inbox = Inbox::new(Logger::disabled());
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        inbox.set_handler(Arc::new(move |msg: InboundMessage| {
            let sink = Arc::clone(&sink);
            async move {
                assert!(msg.id != "boom", "handler failure");
                sink.lock().await.push(msg.id);
            }
        }));
        inbox.start();

        inbox.push(sample_message("boom"));
        inbox.push(sample_message("ok"));
        inbox.drained().await;

        assert_eq!(*seen.lock().await, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let inbox = Inbox::new(Logger::disabled());
        let (handler, seen) = recorder();
        inbox.set_handler(handler);
        inbox.start();
        inbox.start();

        inbox.push(sample_message("x"));
        inbox.drained().await;
        assert_eq!(seen.lock().await.len(), 1);
    }
}
