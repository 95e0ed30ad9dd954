//! Chat commands
//!
//! A chat line is a command when it starts with the command prefix or the
//! bot's name followed by a space. Private messages may omit both.
//! Replies go back to where the command came from: the channel, or the
//! sender for private messages.

use crate::catalog::TrackCatalog;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::messages::{strip_html_tags, MessageTable, ResultPages};
use crate::playback::persistence::{load_playlist, save_playlist};
use crate::playback::PlaybackController;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Enqueue (when given) then play whatever is pending
    Play(Option<String>),
    PlayNext(String),
    Stop,
    Skip(i64),
    Volume(Option<f32>),
    List,
    Random(usize),
    Search(String),
    /// Queue the first YouTube hit for free text
    YouTube(String),
    More,
    Less,
    Radio,
    Target(String),
    Untarget(String),
    Save(Option<String>),
    Load(Option<String>),
    Help,
}

/// Split a chat line into lower-cased command word and argument
///
/// Returns `None` when the line is not addressed to the bot.
pub fn split_command<'a>(
    message: &'a str,
    prefix: &str,
    bot_name: &str,
    is_private: bool,
) -> Option<(String, &'a str)> {
    let message = message.trim();
    let body = if !prefix.is_empty() && message.starts_with(prefix) {
        &message[prefix.len()..]
    } else if let Some(rest) = strip_name(message, bot_name) {
        rest
    } else if is_private {
        message
    } else {
        return None;
    };

    let body = body.trim_start();
    let (word, arg) = match body.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, arg.trim()),
        None => (body, ""),
    };
    if word.is_empty() {
        return None;
    }
    Some((word.to_lowercase(), arg))
}

fn strip_name<'a>(message: &'a str, bot_name: &str) -> Option<&'a str> {
    if bot_name.is_empty() {
        return None;
    }
    let head = message.get(..bot_name.len())?;
    if !head.eq_ignore_ascii_case(bot_name) {
        return None;
    }
    let rest = &message[bot_name.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Parse a chat line
///
/// # Returns
/// `Ok(None)` for lines that are not commands or name an unknown command,
/// `Err(InvalidCommand)` for known commands with a bad argument
pub fn parse_command(
    message: &str,
    prefix: &str,
    bot_name: &str,
    is_private: bool,
) -> Result<Option<Command>> {
    let Some((word, raw_arg)) = split_command(message, prefix, bot_name, is_private) else {
        return Ok(None);
    };
    let arg = strip_html_tags(raw_arg).trim().to_string();
    let optional = || (!arg.is_empty()).then(|| arg.clone());
    let required = |name: &str| {
        if arg.is_empty() {
            Err(Error::InvalidCommand(format!("{} needs an argument", name)))
        } else {
            Ok(arg.clone())
        }
    };

    let command = match word.as_str() {
        "play" => Command::Play(optional()),
        "playnext" => Command::PlayNext(required("playnext")?),
        "stop" => Command::Stop,
        "skip" => Command::Skip(arg.parse().unwrap_or(1)),
        "vol" | "volume" => match optional() {
            None => Command::Volume(None),
            Some(value) => Command::Volume(Some(value.parse().map_err(|_| {
                Error::InvalidCommand(format!("not a volume: {}", value))
            })?)),
        },
        "list" => Command::List,
        "rand" => Command::Random(
            required("rand")?
                .parse()
                .map_err(|_| Error::InvalidCommand(format!("not a count: {}", arg)))?,
        ),
        "search" => Command::Search(required("search")?),
        "yt" => Command::YouTube(required("yt")?),
        "more" => Command::More,
        "less" => Command::Less,
        "radio" => Command::Radio,
        "target" => Command::Target(required("target")?),
        "untarget" => Command::Untarget(required("untarget")?),
        "save" => Command::Save(optional()),
        "load" => Command::Load(optional()),
        "help" => Command::Help,
        other => {
            debug!(command = other, "Ignoring unknown command");
            return Ok(None);
        }
    };
    Ok(Some(command))
}

/// Settings the command layer needs
#[derive(Debug, Clone)]
pub struct CommandSettings {
    pub prefix: String,
    pub bot_name: String,
    pub max_lines: usize,
    pub playlist_dir: PathBuf,
    pub playlist_name: String,
}

/// Executes chat commands against the controller
#[derive(Clone)]
pub struct CommandHandler {
    controller: PlaybackController,
    catalog: Arc<dyn TrackCatalog>,
    dispatcher: Dispatcher,
    settings: Arc<CommandSettings>,
    pages: Arc<Mutex<ResultPages>>,
}

impl CommandHandler {
    pub fn new(
        controller: PlaybackController,
        catalog: Arc<dyn TrackCatalog>,
        dispatcher: Dispatcher,
        settings: CommandSettings,
    ) -> Self {
        Self {
            controller,
            catalog,
            dispatcher,
            settings: Arc::new(settings),
            pages: Arc::new(Mutex::new(ResultPages::default())),
        }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    /// Handle one incoming chat line; returns true when it was a command
    pub async fn handle(&self, sender: &str, message: &str, is_private: bool) -> bool {
        let parsed = parse_command(
            message,
            &self.settings.prefix,
            &self.settings.bot_name,
            is_private,
        );
        let command = match parsed {
            Ok(Some(command)) => command,
            Ok(None) => return false,
            Err(e) => {
                self.reply(sender, is_private, format!("Error: {}", e));
                return true;
            }
        };

        info!(sender, ?command, "Command received");
        if let Err(e) = self.execute(sender, is_private, command).await {
            debug!("Command failed: {}", e);
            self.reply(sender, is_private, format!("Error: {}", e));
        }
        true
    }

    async fn execute(&self, sender: &str, is_private: bool, command: Command) -> Result<()> {
        match command {
            Command::Play(arg) => {
                if let Some(arg) = arg {
                    let track = self.controller.add_to_queue(&arg).await?;
                    self.reply(sender, is_private, format!("Added: {}", track.display_name));
                }
                // Start failures are already reported by the controller
                if let Err(e) = self.controller.play_pending().await {
                    debug!("Play failed: {}", e);
                }
            }
            Command::PlayNext(arg) => {
                let track = self.controller.add_next(&arg).await?;
                self.reply(sender, is_private, format!("Playing next: {}", track.display_name));
            }
            Command::Stop => self.controller.stop(true).await,
            Command::Skip(amount) => {
                if let Err(e) = self.controller.skip(amount).await {
                    debug!("Skip failed: {}", e);
                }
            }
            Command::Volume(None) => {
                let volume = self.controller.volume();
                self.reply(sender, is_private, format!("Current Volume: {:.2}", volume));
            }
            Command::Volume(Some(value)) => {
                let volume = self.controller.set_volume(value);
                self.reply(sender, is_private, format!("Current Volume: {:.2}", volume));
            }
            Command::List => self.list(sender, is_private).await,
            Command::Random(count) => {
                let added = self.controller.add_random(count.min(self.settings.max_lines)).await?;
                if added.is_empty() {
                    return Err(Error::TrackNotFound("catalog is empty".to_string()));
                }
                let mut table = MessageTable::new("Added", &[]);
                for track in &added {
                    table.add_row(&[track.display_name.as_str()]);
                }
                self.reply(sender, is_private, table.finish());
            }
            Command::Search(query) => self.search(sender, is_private, &query).await?,
            Command::YouTube(query) => {
                let track = self.controller.add_from_search(&query).await?;
                self.reply(sender, is_private, format!("Added: {}", track.display_name));
                if let Err(e) = self.controller.play_pending().await {
                    debug!("Play failed: {}", e);
                }
            }
            Command::More => {
                let page = self.pages().more(sender, self.settings.max_lines);
                let rows = page.unwrap_or_else(|| vec!["Nothing more.".to_string()]);
                self.reply(sender, is_private, rows_table("More Results", &rows));
            }
            Command::Less => {
                let page = self.pages().less(sender, self.settings.max_lines);
                let rows = page.unwrap_or_else(|| vec!["Nothing less.".to_string()]);
                self.reply(sender, is_private, rows_table("Less Results", &rows));
            }
            Command::Radio => {
                let enabled = self.controller.toggle_radio();
                let state = if enabled { "Enabled" } else { "Disabled" };
                self.reply(sender, is_private, format!("Radio Mode: {}", state));
            }
            Command::Target(user) => {
                if self.controller.add_target(&user).await {
                    self.reply(sender, is_private, format!("Now also playing to {}", user));
                }
            }
            Command::Untarget(user) => {
                if self.controller.remove_target(&user).await {
                    self.reply(sender, is_private, format!("No longer playing to {}", user));
                }
            }
            Command::Save(name) => {
                let name = name.unwrap_or_else(|| self.settings.playlist_name.clone());
                let remaining = self.controller.remaining_tracks().await;
                if save_playlist(&self.settings.playlist_dir, &name, &remaining).await? {
                    self.reply(sender, is_private, format!("Saved {} track(s) as {}", remaining.len(), name));
                } else {
                    self.reply(sender, is_private, "Nothing to save.");
                }
            }
            Command::Load(name) => {
                let name = name.unwrap_or_else(|| self.settings.playlist_name.clone());
                match load_playlist(&self.settings.playlist_dir, &name).await? {
                    Some(saved) => {
                        let count = saved.tracks.len();
                        self.controller.replace_queue(saved.tracks).await;
                        self.reply(sender, is_private, format!("Loaded {} track(s) from {}", count, name));
                    }
                    None => self.reply(sender, is_private, format!("No saved playlist named {}", name)),
                }
            }
            Command::Help => self.reply(sender, is_private, self.help()),
        }
        Ok(())
    }

    async fn list(&self, sender: &str, is_private: bool) {
        let names = self.controller.playlist_list(self.settings.max_lines).await;
        let count = self.controller.playlist_count().await;

        let mut table = MessageTable::new("Playlist", &[]);
        for (i, name) in names.iter().enumerate() {
            table.add_row(&[format!("# {}: {}", i, name).as_str()]);
        }
        table.add_row(&[format!("{} Track(s) Queued.", count).as_str()]);
        self.reply(sender, is_private, table.finish());
    }

    async fn search(&self, sender: &str, is_private: bool, query: &str) -> Result<()> {
        let results = self.catalog.search(query).await?;
        if results.is_empty() {
            self.reply(sender, is_private, format!("No results for {}", query));
            return Ok(());
        }

        let (first, extra) = self.pages().save(sender, results, self.settings.max_lines);
        let mut table = MessageTable::new("Search Results", &[]);
        for row in &first {
            table.add_row(&[row.as_str()]);
        }
        if extra > 0 {
            table.add_row(&["---"]);
            table.add_row(&[format!("There are {} additional results.", extra).as_str()]);
            table.add_row(&["Use <b>more</b> and <b>less</b> to see them."]);
        }
        self.reply(sender, is_private, table.finish());
        Ok(())
    }

    fn help(&self) -> String {
        let p = &self.settings.prefix;
        let mut table = MessageTable::new("Commands", &[]);
        for line in [
            "play [id|url]",
            "playnext <id|url>",
            "stop",
            "skip [n]",
            "vol [0.0-1.0]",
            "list",
            "rand <n>",
            "search <text>",
            "more",
            "less",
            "yt <text>",
            "radio",
            "target <user>",
            "untarget <user>",
            "save [name]",
            "load [name]",
        ] {
            table.add_row(&[format!("{}{}", p, line).as_str()]);
        }
        table.finish()
    }

    fn pages(&self) -> MutexGuard<'_, ResultPages> {
        match self.pages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn reply(&self, sender: &str, is_private: bool, text: impl Into<String>) {
        if is_private {
            self.dispatcher.to_user(sender, text);
        } else {
            self.dispatcher.to_channel(text);
        }
    }
}

fn rows_table(header: &str, rows: &[String]) -> String {
    let mut table = MessageTable::new(header, &[]);
    for row in rows {
        table.add_row(&[row.as_str()]);
    }
    table.finish()
}
