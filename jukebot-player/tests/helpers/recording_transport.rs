//! Transport that records deliveries with their (virtual) timestamps

use async_trait::async_trait;
use jukebot_player::dispatch::{Destination, OutboundMessage, Transport};
use jukebot_player::error::{Error, Result};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Delivery {
    pub at: Instant,
    pub message: OutboundMessage,
}

#[derive(Default)]
pub struct RecordingTransport {
    deliveries: Mutex<Vec<Delivery>>,
    unknown_users: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to this user fail with `UserNotFound`
    pub fn forget_user(&self, name: &str) {
        self.unknown_users.lock().unwrap().insert(name.to_string());
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.deliveries().into_iter().map(|d| d.message.text).collect()
    }

    pub fn texts_to(&self, destination: &Destination) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|d| &d.message.destination == destination)
            .map(|d| d.message.text)
            .collect()
    }

    /// Wait until at least `count` messages were delivered
    pub async fn wait_for(&self, count: usize) -> Vec<Delivery> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.deliveries.lock().unwrap().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {} deliveries", count);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.deliveries()
    }

    fn record(&self, destination: Destination, text: &str) {
        self.deliveries.lock().unwrap().push(Delivery {
            at: Instant::now(),
            message: OutboundMessage::new(destination, text),
        });
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_to_channel(&self, text: &str) -> Result<()> {
        self.record(Destination::Channel, text);
        Ok(())
    }

    async fn send_to_user(&self, user: &str, text: &str) -> Result<()> {
        if self.unknown_users.lock().unwrap().contains(user) {
            return Err(Error::UserNotFound(user.to_string()));
        }
        self.record(Destination::User(user.to_string()), text);
        Ok(())
    }

    async fn set_status(&self, text: &str) -> Result<()> {
        self.record(Destination::OwnStatus, text);
        Ok(())
    }
}
