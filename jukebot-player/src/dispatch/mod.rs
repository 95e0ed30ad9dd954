//! Outbound message dispatcher
//!
//! Every chat message and status update goes through one FIFO queue drained
//! by a single worker task, so messages reach the transport in submission
//! order no matter which task produced them. Text messages pass through a
//! burst window; status (comment) updates bypass it but keep their place in
//! the queue.

pub mod throttle;

pub use throttle::{BurstPolicy, BurstWindow};

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a message goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The bot's current channel
    Channel,
    /// Private message to a named user
    User(String),
    /// The bot's own status comment
    OwnStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: Destination,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(destination: Destination, text: impl Into<String>) -> Self {
        Self {
            destination,
            text: text.into(),
        }
    }
}

/// Delivery side of the dispatcher
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to_channel(&self, text: &str) -> Result<()>;

    /// Returns `Error::UserNotFound` when no such user is connected
    async fn send_to_user(&self, user: &str, text: &str) -> Result<()>;

    async fn set_status(&self, text: &str) -> Result<()>;
}

/// Cloneable handle for enqueueing outbound messages
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Dispatcher {
    /// Start the worker task
    ///
    /// The worker exits after every `Dispatcher` clone has been dropped and
    /// the queue is drained.
    pub fn spawn(transport: Arc<dyn Transport>, policy: BurstPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, transport, policy));
        (Self { tx }, worker)
    }

    /// Enqueue a message; never blocks
    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::DispatcherClosed)
    }

    pub fn to_channel(&self, text: impl Into<String>) {
        self.enqueue(OutboundMessage::new(Destination::Channel, text));
    }

    pub fn to_user(&self, user: &str, text: impl Into<String>) {
        self.enqueue(OutboundMessage::new(Destination::User(user.to_string()), text));
    }

    pub fn set_status(&self, text: impl Into<String>) {
        self.enqueue(OutboundMessage::new(Destination::OwnStatus, text));
    }

    fn enqueue(&self, message: OutboundMessage) {
        if let Err(e) = self.send(message) {
            warn!("Dropping outbound message: {}", e);
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    transport: Arc<dyn Transport>,
    policy: BurstPolicy,
) {
    let mut window = BurstWindow::new(policy);
    debug!(?policy, "Dispatcher worker started");

    while let Some(message) = rx.recv().await {
        match message.destination {
            Destination::OwnStatus => {
                if let Err(e) = transport.set_status(&message.text).await {
                    warn!("Failed to update status comment: {}", e);
                }
            }
            Destination::Channel => {
                throttle(&mut window).await;
                if let Err(e) = transport.send_to_channel(&message.text).await {
                    warn!("Failed to send channel message: {}", e);
                }
            }
            Destination::User(user) => {
                throttle(&mut window).await;
                match transport.send_to_user(&user, &message.text).await {
                    Ok(()) => {}
                    Err(Error::UserNotFound(name)) => {
                        warn!(user = %name, "Couldn't find user, message dropped");
                    }
                    Err(e) => warn!(user = %user, "Failed to send private message: {}", e),
                }
            }
        }
    }

    info!("Dispatcher worker stopped");
}

async fn throttle(window: &mut BurstWindow) {
    if let Some(pause) = window.admit(Instant::now()) {
        debug!(?pause, "Burst limit reached, pausing");
        tokio::time::sleep(pause).await;
    }
}
