//! Child-process voice connection
//!
//! Decodes with `ffmpeg` (fed by `yt-dlp` for URLs) into signed 16-bit
//! little-endian PCM, 48 kHz stereo, paced at real time. A pump task scales
//! each sample by the live volume and writes the stream to a sink: a file or
//! FIFO when configured, otherwise it is discarded.

use crate::error::{Error, Result};
use crate::playback::session::{SessionSource, SessionState, VoiceConnection, VoiceSession};
use crate::playback::targets::{UserRef, VoiceTargetRule};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 20 ms of 48 kHz stereo s16le
const CHUNK_BYTES: usize = 3840;

/// Executables and output for the process connection
#[derive(Debug, Clone)]
pub struct ProcessVoiceConfig {
    pub ffmpeg_path: PathBuf,
    pub ytdlp_path: PathBuf,
    /// PCM destination; `None` discards audio
    pub output: Option<PathBuf>,
}

impl Default for ProcessVoiceConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            output: None,
        }
    }
}

/// `VoiceConnection` backed by local child processes
pub struct ProcessVoice {
    config: ProcessVoiceConfig,
    users: RwLock<Vec<UserRef>>,
    targets: RwLock<Option<VoiceTargetRule>>,
}

impl ProcessVoice {
    pub fn new(config: ProcessVoiceConfig) -> Self {
        Self {
            config,
            users: RwLock::new(Vec::new()),
            targets: RwLock::new(None),
        }
    }

    /// Make a user known to `find_user`, returning its reference
    pub fn register_user(&self, name: &str) -> UserRef {
        let mut users = match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = users.iter().find(|u| u.name == name) {
            return existing.clone();
        }
        let user = UserRef {
            session_id: users.len() as u32 + 1,
            name: name.to_string(),
        };
        users.push(user.clone());
        user
    }

    /// Routing rule last applied
    pub fn current_targets(&self) -> Option<VoiceTargetRule> {
        match self.targets.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn spawn_fetcher(&self, url: &str) -> Result<Child> {
        Command::new(&self.config.ytdlp_path)
            .args(["--no-playlist", "-f", "bestaudio", "--rm-cache-dir", "-q", "-o", "-"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SessionStartFailed(format!("yt-dlp: {}", e)))
    }

    async fn open_sink(&self) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        match &self.config.output {
            Some(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| {
                        Error::SessionStartFailed(format!("{}: {}", path.display(), e))
                    })?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(tokio::io::sink())),
        }
    }
}

#[async_trait]
impl VoiceConnection for ProcessVoice {
    async fn start(&self, source: SessionSource, volume: f32) -> Result<Arc<dyn VoiceSession>> {
        let mut decoder = Command::new(&self.config.ffmpeg_path);
        decoder.args(["-hide_banner", "-loglevel", "error", "-re"]);

        let fetcher = match &source {
            SessionSource::File(path) => {
                decoder.arg("-i").arg(path).stdin(Stdio::null());
                None
            }
            SessionSource::Url(url) => {
                let mut fetcher = self.spawn_fetcher(url)?;
                let piped: Stdio = fetcher
                    .stdout
                    .take()
                    .ok_or_else(|| Error::SessionStartFailed("yt-dlp stdout unavailable".into()))?
                    .try_into()
                    .map_err(|e: std::io::Error| Error::SessionStartFailed(e.to_string()))?;
                decoder.args(["-i", "-"]).stdin(piped);
                Some(fetcher)
            }
        };

        decoder
            .args(["-ac", "2", "-ar", "48000", "-f", "s16le", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = decoder
            .spawn()
            .map_err(|e| Error::SessionStartFailed(format!("ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SessionStartFailed("ffmpeg stdout unavailable".into()))?;
        let sink = self.open_sink().await?;

        let (done_tx, done_rx) = watch::channel(false);
        let session = Arc::new(ProcessSession {
            volume_bits: Arc::new(AtomicU32::new(volume.to_bits())),
            playing: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            done: done_rx,
        });

        debug!(?source, "Started decoder process");
        tokio::spawn(pump(
            PumpHandles {
                decoder: child,
                fetcher,
                volume_bits: Arc::clone(&session.volume_bits),
                playing: Arc::clone(&session.playing),
                cancel: session.cancel.clone(),
                done: done_tx,
            },
            stdout,
            sink,
        ));

        Ok(session)
    }

    fn find_user(&self, name: &str) -> Option<UserRef> {
        let users = match self.users.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.iter().find(|u| u.name == name).cloned()
    }

    async fn apply_voice_targets(&self, rule: Option<VoiceTargetRule>) -> Result<()> {
        match &rule {
            Some(rule) => {
                let names: Vec<&str> = rule.users.iter().map(|u| u.name.as_str()).collect();
                info!(?names, "Voice targets applied");
            }
            None => info!("Voice targets cleared, broadcasting to channel"),
        }
        let mut targets = match self.targets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *targets = rule;
        Ok(())
    }
}

/// One decoder pipeline
pub struct ProcessSession {
    volume_bits: Arc<AtomicU32>,
    playing: Arc<AtomicBool>,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

#[async_trait]
impl VoiceSession for ProcessSession {
    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::SeqCst);
    }

    fn state(&self) -> SessionState {
        if self.playing.load(Ordering::SeqCst) {
            SessionState::Playing
        } else {
            SessionState::Stopped
        }
    }

    async fn wait_for_completion(&self) {
        let mut done = self.done.clone();
        // A dropped sender also means the pump is gone
        let _ = done.wait_for(|finished| *finished).await;
    }
}

struct PumpHandles {
    decoder: Child,
    fetcher: Option<Child>,
    volume_bits: Arc<AtomicU32>,
    playing: Arc<AtomicBool>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
}

async fn pump<R, W>(mut handles: PumpHandles, mut pcm: R, mut sink: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_BYTES];
    let mut filled = 0usize;

    loop {
        let read = tokio::select! {
            _ = handles.cancel.cancelled() => {
                debug!("Decoder stop requested");
                break;
            }
            read = pcm.read(&mut buf[filled..]) => read,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                let whole = filled - filled % 2;
                let volume = f32::from_bits(handles.volume_bits.load(Ordering::SeqCst));
                scale_pcm(&mut buf[..whole], volume);
                if let Err(e) = sink.write_all(&buf[..whole]).await {
                    warn!("PCM sink write failed: {}", e);
                    break;
                }
                buf.copy_within(whole..filled, 0);
                filled -= whole;
            }
            Err(e) => {
                warn!("Decoder read failed: {}", e);
                break;
            }
        }
    }

    let _ = sink.flush().await;
    let _ = handles.decoder.start_kill();
    if let Some(fetcher) = handles.fetcher.as_mut() {
        let _ = fetcher.start_kill();
        let _ = fetcher.wait().await;
    }
    match handles.decoder.wait().await {
        Ok(status) => debug!(%status, "Decoder exited"),
        Err(e) => warn!("Failed to reap decoder: {}", e),
    }

    handles.playing.store(false, Ordering::SeqCst);
    let _ = handles.done.send(true);
}

/// Scale s16le samples in place
pub fn scale_pcm(samples: &mut [u8], volume: f32) {
    if (volume - 1.0).abs() < f32::EPSILON {
        return;
    }
    for pair in samples.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 * volume;
        let scaled = sample.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        pair.copy_from_slice(&scaled.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_scale_pcm_half() {
        let mut pcm = encode(&[1000, -1000, 0, i16::MAX]);
        scale_pcm(&mut pcm, 0.5);
        assert_eq!(pcm, encode(&[500, -500, 0, i16::MAX / 2]));
    }

    #[test]
    fn test_scale_pcm_unity_is_untouched() {
        let original = encode(&[123, -456]);
        let mut pcm = original.clone();
        scale_pcm(&mut pcm, 1.0);
        assert_eq!(pcm, original);
    }

    #[test]
    fn test_scale_pcm_mute() {
        let mut pcm = encode(&[32000, -32000]);
        scale_pcm(&mut pcm, 0.0);
        assert_eq!(pcm, encode(&[0, 0]));
    }

    #[test]
    fn test_register_and_find_user() {
        let voice = ProcessVoice::new(ProcessVoiceConfig::default());
        let alice = voice.register_user("alice");
        assert_eq!(voice.register_user("alice"), alice);
        assert_eq!(voice.find_user("alice"), Some(alice));
        assert!(voice.find_user("bob").is_none());
    }

    #[tokio::test]
    async fn test_apply_targets_is_recorded() {
        let voice = ProcessVoice::new(ProcessVoiceConfig::default());
        let bob = voice.register_user("bob");
        let rule = VoiceTargetRule {
            users: vec![bob],
            include_own_channel: true,
        };
        voice.apply_voice_targets(Some(rule.clone())).await.unwrap();
        assert_eq!(voice.current_targets(), Some(rule));
        voice.apply_voice_targets(None).await.unwrap();
        assert!(voice.current_targets().is_none());
    }

    #[tokio::test]
    async fn test_missing_decoder_fails_to_start() {
        let voice = ProcessVoice::new(ProcessVoiceConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..ProcessVoiceConfig::default()
        });
        let result = voice
            .start(SessionSource::File(PathBuf::from("/tmp/a.mp3")), 0.5)
            .await;
        assert!(matches!(result, Err(Error::SessionStartFailed(_))));
    }
}
