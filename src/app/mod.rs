//! Terminal driver for the reading session.
//!
//! Wires the HTTP client, progress store, narration cache and audio device
//! into a [`ReadingSession`], then multiplexes typed commands, playback
//! notifications and Ctrl+C on one task so the session is only ever touched
//! from a single place.

mod messages;
mod view;

use anyhow::{Context, Result};
use lectio_core::api::{HttpApi, Narrator, ReadingApi};
use lectio_core::audio::AudioCache;
use lectio_core::audio::output::PlaybackEvent;
use lectio_core::audio::rodio_output::RodioOutput;
use lectio_core::cache;
use lectio_core::config::{AppConfig, LocalPositionsMode};
use lectio_core::listening::ListeningController;
use lectio_core::passage::SectionKind;
use lectio_core::progress::{FilePositions, LocalPositions, MemoryPositions, ProgressStore};
use lectio_core::session::{ReadingSession, SessionCommand, Transition};
use messages::{HELP, Input, parse_input};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

pub struct App {
    session: ReadingSession,
    playback_events: UnboundedReceiver<PlaybackEvent>,
}

impl App {
    /// Must be called from inside the tokio runtime.
    pub fn build(config: &AppConfig) -> Result<Self> {
        let http = Arc::new(
            HttpApi::new(config.api_base_url.clone(), config.api_token.clone())
                .context("Failed to build HTTP client")?,
        );
        let api: Arc<dyn ReadingApi> = http.clone();
        let narrator: Arc<dyn Narrator> = http;

        let cache_root = Path::new(&config.cache_dir);
        let local: Box<dyn LocalPositions> = match config.local_positions {
            LocalPositionsMode::File => Box::new(FilePositions::new(cache_root)),
            LocalPositionsMode::Memory => Box::new(MemoryPositions::default()),
        };
        let progress = ProgressStore::new(local, api.clone());

        let (output, playback_events) =
            RodioOutput::spawn(config.volume).context("Failed to start the audio thread")?;
        let audio_cache = Arc::new(AudioCache::new(narrator, cache::audio_dir(cache_root)));
        let listening =
            ListeningController::new(audio_cache, Arc::new(output), config.prefetch_ahead);

        info!(
            api = %config.api_base_url,
            cache = %cache_root.display(),
            translation = %config.default_translation,
            prefetch = config.prefetch_ahead,
            "Reader configured"
        );
        let session = ReadingSession::new(
            api,
            progress,
            listening,
            config.default_translation.clone(),
        );
        Ok(Self {
            session,
            playback_events,
        })
    }

    /// Open today's reading for `section` and process input until quit,
    /// end of input, or Ctrl+C.
    pub async fn run(mut self, section: SectionKind) -> Result<()> {
        let (quit_tx, mut quit_rx) = mpsc::unbounded_channel::<()>();
        if let Err(err) = ctrlc::set_handler(move || {
            info!("Received Ctrl+C; closing the session");
            let _ = quit_tx.send(());
        }) {
            warn!("Failed to install Ctrl+C signal handler: {err}");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let event = self
            .session
            .apply_command(SessionCommand::LoadToday { section })
            .await;
        print!("{}", view::render(&event.snapshot));
        println!("(h for help)");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line.context("Failed to read input")? {
                        Some(line) => line,
                        None => {
                            debug!("Input closed");
                            break;
                        }
                    };
                    match parse_input(&line) {
                        Input::Command(command) => {
                            let event = self.session.apply_command(command).await;
                            debug!(action = event.action, "Applied command");
                            print!("{}", view::render(&event.snapshot));
                        }
                        Input::Help => println!("{HELP}"),
                        Input::Quit => break,
                        Input::Unknown(text) if text.is_empty() => {}
                        Input::Unknown(text) => println!("? {text}"),
                    }
                }
                Some(event) = self.playback_events.recv() => {
                    if let Transition::Moved(_) = self.session.on_playback_event(event) {
                        print!("{}", view::render(&self.session.snapshot()));
                    }
                }
                _ = quit_rx.recv() => break,
            }
        }

        self.session.shutdown().await;
        Ok(())
    }
}
