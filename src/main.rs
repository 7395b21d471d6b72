use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::{io, time::Duration};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event as CEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::sleep;
use video_splitter::Ffmpeg;

use crate::app::{App, Command, Update};
use crate::client::SplitClient;

mod app;
mod client;
mod format;
mod staging;
mod ui;

/// Terminal front end for the video splitter server.
#[derive(Debug, Parser)]
#[command(name = "split-console", version)]
struct Args {
    /// Video to stage on startup.
    file: Option<PathBuf>,

    #[arg(long, env = "SPLIT_SERVER_URL", default_value = "http://127.0.0.1:10000")]
    server: String,

    /// Initial part length in seconds.
    #[arg(long, default_value_t = 60)]
    segment_secs: u32,

    /// Where downloaded outputs are saved.
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    /// Write logs here; the terminal itself belongs to the UI.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe: String,
}

/// Everything background tasks need to carry out a `Command`.
#[derive(Clone)]
struct Runner {
    client: SplitClient,
    ffmpeg: Ffmpeg,
    download_dir: PathBuf,
    updates: UnboundedSender<Update>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    let client = SplitClient::new(args.server.clone())?;
    let ffmpeg = Ffmpeg::new("ffmpeg", args.ffprobe.clone())?;
    let (updates, rx) = unbounded_channel();
    let runner = Runner {
        client,
        ffmpeg,
        download_dir: args.download_dir.clone(),
        updates,
    };

    let mut app = App::new(args.segment_secs.max(1));
    runner.dispatch(Command::Refresh);
    if let Some(file) = &args.file {
        if let Some(cmd) = app.stage_input(&file.display().to_string()) {
            runner.dispatch(cmd);
        }
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &runner, rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    runner: &Runner,
    mut updates: UnboundedReceiver<Update>,
) -> anyhow::Result<()> {
    loop {
        while let Ok(update) = updates.try_recv() {
            if let Some(cmd) = app.apply(update) {
                runner.dispatch(cmd);
            }
        }

        terminal.draw(|f| ui::draw(f, app, runner.client.base_url()))?;

        tokio::task::yield_now().await;

        if event::poll(Duration::from_millis(150))? {
            let cmd = match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                CEvent::Paste(text) => app.handle_paste(&text),
                _ => None,
            };
            match cmd {
                Some(Command::Quit) => break,
                Some(cmd) => runner.dispatch(cmd),
                None => {}
            }
        }
        sleep(Duration::from_millis(20)).await;
    }

    Ok(())
}

impl Runner {
    /// Runs `cmd` in the background; its outcome comes back as an `Update`.
    fn dispatch(&self, cmd: Command) {
        let runner = self.clone();
        match cmd {
            Command::Quit => {}
            Command::ProbeDuration(path) => {
                tokio::spawn(async move {
                    let duration = match runner.ffmpeg.probe_duration(&path).await {
                        Ok(d) => Some(d),
                        Err(e) => {
                            tracing::warn!(error = %e, "Could not read video duration");
                            None
                        }
                    };
                    runner.send(Update::DurationProbed { path, duration });
                });
            }
            Command::Split {
                video,
                segment_secs,
            } => {
                tokio::spawn(async move {
                    let progress = runner.updates.clone();
                    let result = runner
                        .client
                        .split(&video, segment_secs, move |p| {
                            let _ = progress.send(Update::Split(p));
                        })
                        .await
                        .map_err(|e| {
                            tracing::error!(error = %e, "Split request failed");
                            e.to_string()
                        });
                    runner.send(Update::SplitFinished(result));
                });
            }
            Command::Clear => {
                tokio::spawn(async move {
                    let result = runner.client.clear().await.map_err(|e| {
                        tracing::error!(error = %e, "Clear request failed");
                        e.to_string()
                    });
                    runner.send(Update::ClearFinished(result));
                });
            }
            Command::Refresh => {
                tokio::spawn(async move {
                    let result = runner.client.list_files().await.map_err(|e| e.to_string());
                    runner.send(Update::Files(result));
                });
            }
            Command::Download(name) => {
                tokio::spawn(async move {
                    let result = runner
                        .client
                        .download(&name, &runner.download_dir)
                        .await
                        .map_err(|e| e.to_string());
                    runner.send(Update::Downloaded(result));
                });
            }
        }
    }

    fn send(&self, update: Update) {
        if self.updates.send(update).is_err() {
            tracing::debug!("UI closed before a background task finished");
        }
    }
}
