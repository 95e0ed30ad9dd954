//! Console front end
//!
//! Stands in for a voice-server chat: stdin lines are channel messages from
//! the console user, and everything the bot says is printed to stdout as
//! plain text. Lines starting with `/msg ` are treated as private messages.

use crate::commands::CommandHandler;
use crate::dispatch::Transport;
use crate::error::{Error, Result};
use crate::messages::strip_html_tags;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name commands typed on the console are attributed to
pub const CONSOLE_USER: &str = "console";

const PRIVATE_PREFIX: &str = "/msg ";

/// `Transport` that prints to a writer
pub struct ConsoleTransport<W = Stdout> {
    out: Mutex<W>,
    users: HashSet<String>,
}

impl ConsoleTransport<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleTransport<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            users: HashSet::from([CONSOLE_USER.to_string()]),
        }
    }

    async fn print(&self, tag: &str, text: &str) -> Result<()> {
        let line = format!("[{}] {}\n", tag, strip_html_tags(text).trim());
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        out.flush().await.map_err(|e| Error::Transport(e.to_string()))
    }

    /// Writer back, for inspection
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> Transport for ConsoleTransport<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn send_to_channel(&self, text: &str) -> Result<()> {
        self.print("channel", text).await
    }

    async fn send_to_user(&self, user: &str, text: &str) -> Result<()> {
        if !self.users.contains(user) {
            return Err(Error::UserNotFound(user.to_string()));
        }
        self.print(&format!("to {}", user), text).await
    }

    async fn set_status(&self, text: &str) -> Result<()> {
        self.print("status", text).await
    }
}

/// Feed stdin lines to the command handler until EOF or shutdown
///
/// Each line is handled on its own task, mirroring concurrent chat events.
pub async fn run_console(handler: CommandHandler, shutdown: CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Console ready, type commands (e.g. !help)");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("Console input closed");
            break;
        };

        let (message, is_private) = match line.strip_prefix(PRIVATE_PREFIX) {
            Some(rest) => (rest.to_string(), true),
            None => (line, false),
        };
        if message.trim().is_empty() {
            continue;
        }

        let handler = handler.clone();
        tokio::spawn(async move {
            handler.handle(CONSOLE_USER, &message, is_private).await;
        });
    }
    Ok(())
}
