use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hummify::backend::{BackendClient, SearchBackend, SearchRequest};
use hummify::catalog::{CatalogSource, CatalogView, Mapper};
use hummify::cli_style::{
    get_styles, print_error, print_key_value, print_page, print_success, print_transport,
};
use hummify::config::{AppConfig, CliConfig, FileConfig, DEFAULT_SAMPLE_RATE, DEFAULT_TIMEOUT_SEC};
use hummify::media::{format_clock, MidiParser};
use hummify::playback::{
    OfflineRenderer, PlayerHandle, PlayerState, SongInfo, SongRef, SongSource, VoiceFactory, Volume,
};
use hummify::shell::AppShell;
use hummify::upload::{FileSize, MediaKind, UploadController, UploadPurpose};

mod repl;

const CARD_COLUMNS: usize = 3;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles(), version)]
struct CliArgs {
    /// Path to a TOML config file. Its values override command line options.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the search backend.
    #[clap(long, global = true, env = "HUMMIFY_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Timeout in seconds for backend requests.
    #[clap(long, global = true, default_value_t = DEFAULT_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    /// Minimum similarity in percent for search results.
    #[clap(long, global = true)]
    pub similarity_threshold: Option<f64>,

    /// Number of cards per page.
    #[clap(long, global = true, default_value_t = 12)]
    pub page_size: usize,

    /// Number of page links around the current page.
    #[clap(long, global = true, default_value_t = 5)]
    pub page_window: usize,

    /// Default volume, 0.0 to 1.0.
    #[clap(long, global = true, default_value_t = 0.8)]
    pub volume: f32,

    /// Sample rate for synthesized audio.
    #[clap(long, global = true, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive shell: load a mapper, upload datasets, search and play.
    Shell {
        /// Where to keep the command history.
        #[clap(long, value_parser = parse_path)]
        history: Option<PathBuf>,
    },

    /// Runs a file through an upload dialog and reports what was accepted.
    Validate {
        purpose: UploadPurpose,
        #[clap(value_parser = parse_path)]
        path: PathBuf,
    },

    /// Lists the songs of a mapper file as cards.
    Catalog {
        #[clap(value_parser = parse_path)]
        mapper: PathBuf,

        /// Only songs whose title or singer contains this text.
        #[clap(long)]
        filter: Option<String>,

        #[clap(long, default_value_t = 1)]
        page: usize,
    },

    /// Sends one query file to the backend and lists the matches.
    Search {
        #[clap(value_parser = parse_path)]
        path: PathBuf,

        /// Search endpoint; the generic one when omitted.
        #[clap(long)]
        kind: Option<MediaKind>,

        /// Mapper used to resolve playable audio for the matches.
        #[clap(long, value_parser = parse_path)]
        mapper: Option<PathBuf>,
    },

    /// Prints the tracks and notes of a MIDI file.
    Inspect {
        #[clap(value_parser = parse_path)]
        path: PathBuf,

        /// Also list every note.
        #[clap(long)]
        notes: bool,
    },

    /// Renders a MIDI file to a WAV file.
    Render {
        #[clap(value_parser = parse_path)]
        path: PathBuf,
        #[clap(value_parser = parse_path)]
        output: PathBuf,
    },

    /// Plays a MIDI file until it ends or CTRL-C.
    Play {
        #[clap(value_parser = parse_path)]
        path: PathBuf,
    },
}

impl CliArgs {
    fn cli_config(&self) -> CliConfig {
        CliConfig {
            backend_url: self.backend_url.clone(),
            request_timeout_sec: self.request_timeout_sec,
            similarity_threshold: self.similarity_threshold,
            page_size: self.page_size,
            page_window: self.page_window,
            volume: self.volume,
            sample_rate: self.sample_rate,
        }
    }
}

/// Drive an indicatif bar from a simulated upload progress channel.
fn show_progress(purpose: UploadPurpose, mut progress: watch::Receiver<u8>) {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("  {msg:>16} [{bar:30.magenta/blue}] {pos:>3}%")
    {
        bar.set_style(style.progress_chars("━╸┄"));
    }
    bar.set_message(purpose.to_string());

    tokio::spawn(async move {
        loop {
            let value = *progress.borrow_and_update();
            bar.set_position(value as u64);
            if value >= 100 {
                bar.finish();
                break;
            }
            if progress.changed().await.is_err() {
                bar.abandon();
                break;
            }
        }
    });
}

/// Voices for live playback: the system audio device when built with
/// `audio-output`, silent otherwise.
#[cfg(feature = "audio-output")]
fn voice_factory() -> Result<(Arc<dyn VoiceFactory>, Option<hummify::playback::AudioOutput>)> {
    let output = hummify::playback::AudioOutput::open_default()?;
    let factory = hummify::playback::SynthVoiceFactory::new(output.bus().clone());
    Ok((Arc::new(factory), Some(output)))
}

#[cfg(not(feature = "audio-output"))]
fn voice_factory() -> Result<(Arc<dyn VoiceFactory>, Option<()>)> {
    info!("Built without audio output, playback is silent");
    Ok((Arc::new(hummify::playback::SilentVoiceFactory), None))
}

async fn run_shell(config: &AppConfig, history: Option<PathBuf>) -> Result<()> {
    let client = BackendClient::new(&config.backend_url, config.request_timeout)?;
    let (factory, _output) = voice_factory()?;
    let player = PlayerHandle::spawn(factory, config.player.clone(), client.http().clone());

    let mut shell = AppShell::new(Arc::new(client), player, config.shell_settings());
    shell.on_progress(Box::new(show_progress));
    repl::run(shell, &config.backend_url, history).await
}

async fn run_validate(config: &AppConfig, purpose: UploadPurpose, path: PathBuf) -> Result<()> {
    let mut controller = UploadController::new(purpose, config.upload);
    controller.open();
    if let Err(err) = controller.select_paths(&[path]).await {
        print_error(&err.to_string());
        bail!("{} rejected", purpose);
    }
    if let Some(progress) = controller.subscribe_progress() {
        show_progress(purpose, progress);
    }
    controller.wait_complete().await?;
    let accepted = controller.confirm()?;

    print_success(&format!("{} accepted for {}", accepted.file.name, purpose));
    print_key_value("Size", &FileSize(accepted.file.size()).to_string());
    if let Some(archive) = &accepted.archive {
        print_key_value("Files", &archive.valid.len().to_string());
    }
    if let Some(mapper) = &accepted.mapper {
        print_key_value("Songs", &mapper.songs.len().to_string());
    }
    if let Some(recording) = &accepted.recording {
        print_key_value(
            "Recording",
            &format!(
                "{} Hz, {} ch, {}",
                recording.sample_rate,
                recording.channels,
                format_clock(recording.seconds)
            ),
        );
    }
    Ok(())
}

async fn run_catalog(
    config: &AppConfig,
    mapper: PathBuf,
    filter: Option<String>,
    page: usize,
) -> Result<()> {
    let mapper = Mapper::load(&mapper).await?;
    let mut view = CatalogView::new(config.page_size, config.page_window);
    view.set_entries(mapper.entries(), CatalogSource::Mapper);
    if let Some(filter) = filter {
        view.set_search_text(filter);
    }
    if !view.request_page(page) {
        bail!("There is no page {}", page);
    }
    print_page(&view.page_view(false), CARD_COLUMNS);
    Ok(())
}

async fn run_search(
    config: &AppConfig,
    path: PathBuf,
    kind: Option<MediaKind>,
    mapper: Option<PathBuf>,
) -> Result<()> {
    let client = BackendClient::new(&config.backend_url, config.request_timeout)?;
    let mapper = match mapper {
        Some(path) => Some(Mapper::load(&path).await?),
        None => None,
    };
    let file = hummify::upload::SelectedFile::read(&path).await?;

    let response = client
        .search(SearchRequest {
            kind,
            file,
            similarity_threshold: config.similarity_threshold,
        })
        .await?;

    let mut view = CatalogView::new(config.page_size, config.page_window);
    view.set_entries(
        response.entries(mapper.as_ref()),
        CatalogSource::SearchResults {
            query_time: response.query_time(),
        },
    );
    print_page(&view.page_view(mapper.is_some()), CARD_COLUMNS);
    Ok(())
}

async fn run_inspect(path: PathBuf, notes: bool) -> Result<()> {
    let timeline = MidiParser::load(&path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    print_key_value("Duration", &format_clock(timeline.duration()));
    print_key_value("Notes", &timeline.note_count().to_string());
    for (i, track) in timeline.tracks.iter().enumerate() {
        let name = track.name.as_deref().unwrap_or("(unnamed)");
        print_key_value(
            &format!("Track {}", i),
            &format!("{} · {} notes", name, track.notes.len()),
        );
        if notes {
            for note in &track.notes {
                println!(
                    "      {:>8.3}s  {:<4} {:>6.3}s  vel {:.2}",
                    note.time, note.name, note.duration, note.velocity
                );
            }
        }
    }
    Ok(())
}

async fn run_render(config: &AppConfig, path: PathBuf, output: PathBuf) -> Result<()> {
    let timeline = MidiParser::load(&path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let renderer = OfflineRenderer::new(config.sample_rate, Volume::new(config.player.volume));
    let summary = tokio::task::spawn_blocking(move || renderer.write_wav_file(&timeline, &output))
        .await
        .context("Render task failed")??;

    print_success(&format!(
        "Rendered {} notes, {} at {} Hz",
        summary.notes,
        format_clock(summary.seconds),
        summary.sample_rate
    ));
    Ok(())
}

async fn run_play(config: &AppConfig, path: PathBuf) -> Result<()> {
    let (factory, _output) = voice_factory()?;
    let player = PlayerHandle::spawn(factory, config.player.clone(), reqwest::Client::new());

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "song".to_string());
    player
        .load(SongRef {
            info: SongInfo::titled(title),
            source: SongSource::File(path),
        })
        .await?;
    let status = player.wait_loaded().await?;
    if status.state == PlayerState::Idle {
        player.shutdown().await;
        bail!("Failed to load the song");
    }
    player.play().await?;

    let mut updates = player.subscribe();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                print_transport(&player.status());
            }
            changed = updates.changed() => {
                if changed.is_err() || updates.borrow().state != PlayerState::Playing {
                    break;
                }
            }
        }
    }

    print_transport(&player.status());
    player.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.cli_config(), file_config)?;
    info!(
        "hummify {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("HUMMIFY_GIT_HASH"),
        env!("HUMMIFY_BUILD_PROFILE")
    );

    match cli_args.command {
        Command::Shell { history } => run_shell(&config, history).await,
        Command::Validate { purpose, path } => run_validate(&config, purpose, path).await,
        Command::Catalog {
            mapper,
            filter,
            page,
        } => run_catalog(&config, mapper, filter, page).await,
        Command::Search { path, kind, mapper } => run_search(&config, path, kind, mapper).await,
        Command::Inspect { path, notes } => run_inspect(path, notes).await,
        Command::Render { path, output } => run_render(&config, path, output).await,
        Command::Play { path } => run_play(&config, path).await,
    }
}
