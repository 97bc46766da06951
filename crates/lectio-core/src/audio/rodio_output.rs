//! `rodio` playback on a dedicated thread.
//!
//! `OutputStream` is not `Send`, so the device lives on its own thread and is
//! driven through a command channel. The thread polls the active sink and
//! reports [`PlaybackEvent::Ended`] when it drains.

use super::AudioHandle;
use super::output::{AudioOutput, PlaybackEvent};
use crate::error::PlaybackError;
use async_trait::async_trait;
use rodio::source::Zero;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, StreamError};
use std::io::Cursor;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Reply = oneshot::Sender<Result<(), PlaybackError>>;

enum AudioCommand {
    Unlock(Reply),
    Play {
        bytes: Vec<u8>,
        attempt: u64,
        reply: Reply,
    },
    Pause,
    Resume,
    Stop,
    Cancel(u64),
    Shutdown,
}

pub struct RodioOutput {
    commands: std_mpsc::Sender<AudioCommand>,
}

impl RodioOutput {
    /// Start the audio thread. The device is opened lazily on first use.
    pub fn spawn(volume: f32) -> std::io::Result<(Self, mpsc::UnboundedReceiver<PlaybackEvent>)> {
        let (commands, command_rx) = std_mpsc::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("lectio-audio".to_string())
            .spawn(move || run_audio_thread(volume, command_rx, event_tx))?;
        Ok((Self { commands }, event_rx))
    }

    fn send(&self, command: AudioCommand) {
        if self.commands.send(command).is_err() {
            warn!("Audio thread has stopped");
        }
    }

    async fn request(
        &self,
        build: impl FnOnce(Reply) -> AudioCommand,
    ) -> Result<(), PlaybackError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| PlaybackError::Failed("audio thread has stopped".to_string()))?;
        response
            .await
            .map_err(|_| PlaybackError::Failed("audio thread dropped the request".to_string()))?
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        let _ = self.commands.send(AudioCommand::Shutdown);
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    async fn unlock(&self) -> Result<(), PlaybackError> {
        self.request(AudioCommand::Unlock).await
    }

    async fn play(&self, handle: &AudioHandle, attempt: u64) -> Result<(), PlaybackError> {
        let bytes = handle
            .read()
            .await
            .map_err(|err| PlaybackError::Failed(format!("failed to read narration: {err}")))?;
        self.request(|reply| AudioCommand::Play {
            bytes,
            attempt,
            reply,
        })
        .await
    }

    fn pause(&self) {
        self.send(AudioCommand::Pause);
    }

    fn resume(&self) {
        self.send(AudioCommand::Resume);
    }

    fn stop(&self) {
        self.send(AudioCommand::Stop);
    }

    fn cancel(&self, attempt: u64) {
        self.send(AudioCommand::Cancel(attempt));
    }
}

struct Device {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

struct AudioThread {
    volume: f32,
    device: Option<Device>,
    primer: Option<Sink>,
    current: Option<(Sink, u64)>,
}

impl AudioThread {
    fn device(&mut self) -> Result<&OutputStreamHandle, PlaybackError> {
        if self.device.is_none() {
            let (stream, handle) = OutputStream::try_default().map_err(map_stream_error)?;
            info!("Opened audio output");
            self.device = Some(Device {
                _stream: stream,
                handle,
            });
        }
        match &self.device {
            Some(device) => Ok(&device.handle),
            None => Err(PlaybackError::Failed("audio output unavailable".to_string())),
        }
    }

    fn unlock(&mut self) -> Result<(), PlaybackError> {
        if self.primer.is_some() {
            return Ok(());
        }
        let handle = self.device()?;
        let sink = Sink::try_new(handle).map_err(|err| PlaybackError::Failed(err.to_string()))?;
        sink.set_volume(0.0);
        sink.append(Zero::<f32>::new(1, 48_000));
        self.primer = Some(sink);
        debug!("Audio output primed");
        Ok(())
    }

    fn play(&mut self, bytes: Vec<u8>, attempt: u64) -> Result<(), PlaybackError> {
        self.stop();
        let volume = self.volume;
        let handle = self.device()?;
        let source = Decoder::new(Cursor::new(bytes))
            .map_err(|err| PlaybackError::Failed(format!("undecodable narration: {err}")))?;
        let sink = Sink::try_new(handle).map_err(|err| PlaybackError::Failed(err.to_string()))?;
        sink.set_volume(volume);
        sink.append(source);
        sink.play();
        self.current = Some((sink, attempt));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((sink, _)) = self.current.take() {
            sink.stop();
        }
    }

    fn poll_finished(&mut self) -> Option<u64> {
        let finished = matches!(&self.current, Some((sink, _)) if sink.empty());
        if finished {
            self.current.take().map(|(_, attempt)| attempt)
        } else {
            None
        }
    }
}

fn run_audio_thread(
    volume: f32,
    commands: std_mpsc::Receiver<AudioCommand>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
) {
    let mut audio = AudioThread {
        volume: volume.clamp(0.0, 1.0),
        device: None,
        primer: None,
        current: None,
    };

    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(AudioCommand::Unlock(reply)) => {
                let _ = reply.send(audio.unlock());
            }
            Ok(AudioCommand::Play {
                bytes,
                attempt,
                reply,
            }) => {
                let _ = reply.send(audio.play(bytes, attempt));
            }
            Ok(AudioCommand::Pause) => {
                if let Some((sink, _)) = &audio.current {
                    sink.pause();
                }
            }
            Ok(AudioCommand::Resume) => {
                if let Some((sink, _)) = &audio.current {
                    sink.play();
                }
            }
            Ok(AudioCommand::Stop) => audio.stop(),
            Ok(AudioCommand::Cancel(attempt)) => {
                if matches!(&audio.current, Some((_, current)) if *current == attempt) {
                    audio.stop();
                }
            }
            Ok(AudioCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if let Some(attempt) = audio.poll_finished() {
            if events.send(PlaybackEvent::Ended { attempt }).is_err() {
                debug!("Playback event receiver dropped");
            }
        }
    }

    audio.stop();
    debug!("Audio thread exiting");
}

fn map_stream_error(err: StreamError) -> PlaybackError {
    match err {
        StreamError::NoDevice => PlaybackError::Blocked,
        other => PlaybackError::Failed(other.to_string()),
    }
}
