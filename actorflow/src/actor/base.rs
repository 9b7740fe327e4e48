//! Generic actor: a private mailbox plus a message loop on its own task
//!
//! Actors never touch each other's state. They hold an [`Address`] for every
//! actor they talk to and communicate only by enqueueing [`ActorMessage`]s.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::EngineError;

/// Actor identifier (e.g. `vertex_fetch`, `coordinator_etl`)
pub type ActorId = String;

/// Correlates a response with the request that triggered it
pub type CorrelationId = Uuid;

/// Envelope for every message exchanged between actors
#[derive(Debug, Clone)]
pub struct ActorMessage<M> {
    pub sender_id: ActorId,
    pub receiver_id: ActorId,
    pub correlation_id: Option<CorrelationId>,
    pub payload: M,
}

impl<M> ActorMessage<M> {
    pub fn new(sender_id: impl Into<ActorId>, receiver_id: impl Into<ActorId>, payload: M) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<CorrelationId>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// What the message loop does after a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorControl {
    Continue,
    Stop,
}

/// Behaviour of an actor
///
/// `handle` is only ever called from the actor's own task, one message at a
/// time, so implementations can mutate their state without locking.
#[async_trait]
pub trait Actor: Send + 'static {
    type Message: Send + 'static;

    fn id(&self) -> &str;

    /// Dispatch one message
    ///
    /// An `Err` is logged and the loop keeps running; a single bad message
    /// does not kill the actor.
    async fn handle(
        &mut self,
        message: ActorMessage<Self::Message>,
    ) -> Result<ActorControl, EngineError>;
}

enum Sender<M> {
    Bounded(mpsc::Sender<ActorMessage<M>>),
    Unbounded(mpsc::UnboundedSender<ActorMessage<M>>),
}

impl<M> Clone for Sender<M> {
    fn clone(&self) -> Self {
        match self {
            Sender::Bounded(tx) => Sender::Bounded(tx.clone()),
            Sender::Unbounded(tx) => Sender::Unbounded(tx.clone()),
        }
    }
}

/// Sending half of a mailbox
pub struct Address<M> {
    actor_id: ActorId,
    sender: Sender<M>,
}

impl<M> Clone for Address<M> {
    fn clone(&self) -> Self {
        Self {
            actor_id: self.actor_id.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Address<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Address").field("actor_id", &self.actor_id).finish()
    }
}

impl<M: Send> Address<M> {
    /// Id of the actor owning the mailbox
    pub fn id(&self) -> &str {
        &self.actor_id
    }

    /// Enqueue a message; waits for room when the mailbox is bounded
    pub async fn send(&self, message: ActorMessage<M>) -> Result<(), EngineError> {
        let sent = match &self.sender {
            Sender::Bounded(tx) => tx.send(message).await.is_ok(),
            Sender::Unbounded(tx) => tx.send(message).is_ok(),
        };
        if sent {
            Ok(())
        } else {
            Err(EngineError::MailboxClosed(self.actor_id.clone()))
        }
    }

    /// Check if the receiving actor has shut down
    pub fn is_closed(&self) -> bool {
        match &self.sender {
            Sender::Bounded(tx) => tx.is_closed(),
            Sender::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Receiving half of a mailbox, FIFO
pub enum Mailbox<M> {
    Bounded(mpsc::Receiver<ActorMessage<M>>),
    Unbounded(mpsc::UnboundedReceiver<ActorMessage<M>>),
}

impl<M> Mailbox<M> {
    pub(crate) async fn recv(&mut self) -> Option<ActorMessage<M>> {
        match self {
            Mailbox::Bounded(rx) => rx.recv().await,
            Mailbox::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Create a mailbox for `actor_id`; `capacity` of None means unbounded
pub fn mailbox<M>(actor_id: impl Into<ActorId>, capacity: Option<usize>) -> (Address<M>, Mailbox<M>) {
    let actor_id = actor_id.into();
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (
                Address {
                    actor_id,
                    sender: Sender::Bounded(tx),
                },
                Mailbox::Bounded(rx),
            )
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Address {
                    actor_id,
                    sender: Sender::Unbounded(tx),
                },
                Mailbox::Unbounded(rx),
            )
        }
    }
}

/// Handle to a running actor
///
/// Cloning is cheap; every clone controls the same task.
pub struct ActorHandle<M> {
    address: Address<M>,
    shutdown: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            shutdown: Arc::clone(&self.shutdown),
            task: Arc::clone(&self.task),
        }
    }
}

impl<M: Send> ActorHandle<M> {
    pub fn id(&self) -> &str {
        self.address.id()
    }

    pub fn address(&self) -> &Address<M> {
        &self.address
    }

    /// Enqueue a message into this actor's mailbox
    pub async fn send(&self, message: ActorMessage<M>) -> Result<(), EngineError> {
        self.address.send(message).await
    }

    /// Check if the message loop is still running
    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(task) => task.as_ref().is_some_and(|t| !t.is_finished()),
            Err(_) => false,
        }
    }

    /// Signal the loop to exit and wait for the task to finish
    ///
    /// A computation in progress is cancelled at its next suspension point.
    /// Calling this more than once, or on an actor that already stopped
    /// itself, is a no-op.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(actor = self.id(), "actor task panicked during shutdown");
                }
            }
        }
    }
}

/// Start `actor`'s message loop on a new task
pub fn spawn_actor<A: Actor>(
    actor: A,
    address: Address<A::Message>,
    mailbox: Mailbox<A::Message>,
) -> ActorHandle<A::Message> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(message_loop(actor, mailbox, shutdown_rx));

    ActorHandle {
        address,
        shutdown: Arc::new(shutdown_tx),
        task: Arc::new(Mutex::new(Some(task))),
    }
}

async fn message_loop<A: Actor>(
    mut actor: A,
    mut mailbox: Mailbox<A::Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(actor = actor.id(), "actor started");

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            message = mailbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // Shutdown also cancels a handler that is still awaiting
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = actor.handle(message) => outcome,
        };

        match outcome {
            Ok(ActorControl::Continue) => {}
            Ok(ActorControl::Stop) => break,
            Err(e) => error!(actor = actor.id(), error = %e, "error handling message"),
        }
    }

    debug!(actor = actor.id(), "actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc as test_mpsc;

    enum Probe {
        Ping(u32),
        Fail,
        Sleep,
        Quit,
    }

    struct ProbeActor {
        id: String,
        seen: test_mpsc::UnboundedSender<u32>,
    }

    #[async_trait]
    impl Actor for ProbeActor {
        type Message = Probe;

        fn id(&self) -> &str {
            &self.id
        }

        async fn handle(&mut self, message: ActorMessage<Probe>) -> Result<ActorControl, EngineError> {
            match message.payload {
                Probe::Ping(n) => {
                    let _ = self.seen.send(n);
                    Ok(ActorControl::Continue)
                }
                Probe::Fail => Err(EngineError::protocol("bad message")),
                Probe::Sleep => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(ActorControl::Continue)
                }
                Probe::Quit => Ok(ActorControl::Stop),
            }
        }
    }

    fn spawn_probe(capacity: Option<usize>) -> (ActorHandle<Probe>, test_mpsc::UnboundedReceiver<u32>) {
        let (seen_tx, seen_rx) = test_mpsc::unbounded_channel();
        let (address, mailbox) = mailbox("probe", capacity);
        let actor = ProbeActor {
            id: "probe".into(),
            seen: seen_tx,
        };
        (spawn_actor(actor, address, mailbox), seen_rx)
    }

    fn msg(payload: Probe) -> ActorMessage<Probe> {
        ActorMessage::new("test", "probe", payload)
    }

    #[tokio::test]
    async fn test_messages_are_processed_in_order() {
        let (handle, mut seen) = spawn_probe(None);
        for n in 0..5 {
            handle.send(msg(Probe::Ping(n))).await.unwrap();
        }
        for n in 0..5 {
            assert_eq!(seen.recv().await, Some(n));
        }
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_bounded_mailbox_delivers() {
        let (handle, mut seen) = spawn_probe(Some(1));
        for n in 0..3 {
            handle.send(msg(Probe::Ping(n))).await.unwrap();
        }
        assert_eq!(seen.recv().await, Some(0));
        assert_eq!(seen.recv().await, Some(1));
        assert_eq!(seen.recv().await, Some(2));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_handler_error_does_not_kill_actor() {
        let (handle, mut seen) = spawn_probe(None);
        handle.send(msg(Probe::Fail)).await.unwrap();
        handle.send(msg(Probe::Ping(7))).await.unwrap();
        assert_eq!(seen.recv().await, Some(7));
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (handle, _seen) = spawn_probe(None);
        handle.stop().await;
        handle.stop().await;
        assert!(!handle.is_running());

        let err = handle.send(msg(Probe::Ping(1))).await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_actor_can_stop_itself() {
        let (handle, _seen) = spawn_probe(None);
        handle.send(msg(Probe::Quit)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.address().is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("actor should close its mailbox after Stop");

        // Stopping an actor that already exited is a no-op
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_busy_handler() {
        let (handle, _seen) = spawn_probe(None);
        handle.send(msg(Probe::Sleep)).await.unwrap();
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop should cancel the sleeping handler");
    }

    #[test]
    fn test_correlation_builder() {
        let id = Uuid::new_v4();
        let message = ActorMessage::new("a", "b", ()).with_correlation(Some(id));
        assert_eq!(message.correlation_id, Some(id));
        assert_eq!(message.sender_id, "a");
        assert_eq!(message.receiver_id, "b");
    }
}
