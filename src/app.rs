use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::client::SplitProgress;
use crate::staging::{self, StagedVideo};

pub const SPLIT_FAILED: &str = "An error occurred while processing the video";
pub const CLEAR_FAILED: &str = "Failed to clear files";

const SEGMENT_INPUT_MAX: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    DropZone,
    Segment,
    Outputs,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::DropZone => Focus::Segment,
            Focus::Segment => Focus::Outputs,
            Focus::Outputs => Focus::DropZone,
        }
    }

    fn previous(self) -> Self {
        match self {
            Focus::DropZone => Focus::Outputs,
            Focus::Segment => Focus::DropZone,
            Focus::Outputs => Focus::Segment,
        }
    }
}

/// What the one in-flight request, if any, is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading { sent: u64, total: u64 },
    Processing(u8),
    Clearing,
}

/// Work the event loop performs on behalf of the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ProbeDuration(PathBuf),
    Split {
        video: StagedVideo,
        segment_secs: u32,
    },
    Clear,
    Refresh,
    Download(String),
    Quit,
}

/// Results reported back by background tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    DurationProbed {
        path: PathBuf,
        duration: Option<Duration>,
    },
    Split(SplitProgress),
    SplitFinished(Result<(), String>),
    ClearFinished(Result<(), String>),
    Files(Result<Vec<String>, String>),
    Downloaded(Result<PathBuf, String>),
}

#[derive(Debug)]
pub struct App {
    pub staged: Option<StagedVideo>,
    pub path_input: String,
    pub segment_input: String,
    pub focus: Focus,
    pub phase: Phase,
    pub files: Vec<String>,
    pub selected: usize,
    /// Modal message; blocks all other input until dismissed.
    pub alert: Option<String>,
    pub status: String,
    default_segment: u32,
}

impl App {
    pub fn new(default_segment: u32) -> Self {
        Self {
            staged: None,
            path_input: String::new(),
            segment_input: default_segment.to_string(),
            focus: Focus::DropZone,
            phase: Phase::Idle,
            files: Vec::new(),
            selected: 0,
            alert: None,
            status: "Drop a video here or type its path".to_string(),
            default_segment,
        }
    }

    pub fn segment_secs(&self) -> Option<u32> {
        self.segment_input.parse().ok().filter(|secs| *secs > 0)
    }

    pub fn busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn split_enabled(&self) -> bool {
        self.staged.is_some() && self.segment_secs().is_some() && !self.busy()
    }

    /// Processing percentage shown by the progress bar.
    pub fn progress_percent(&self) -> u8 {
        match self.phase {
            Phase::Processing(percent) => percent,
            _ => 0,
        }
    }

    pub fn stage_input(&mut self, raw: &str) -> Option<Command> {
        let path = staging::first_dropped_path(raw);
        if path.as_os_str().is_empty() {
            return None;
        }
        match staging::stage(&path) {
            Ok(video) => {
                tracing::info!(file = %video.name, size = video.size, "Staged video");
                self.status = format!("Staged {}", video.name);
                self.path_input.clear();
                self.staged = Some(video);
                Some(Command::ProbeDuration(path))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected file");
                self.alert = Some(format!("Cannot use this file: {e}"));
                None
            }
        }
    }

    pub fn request_split(&mut self) -> Option<Command> {
        if !self.split_enabled() {
            if self.staged.is_none() && !self.busy() {
                self.status = "Choose a video first".to_string();
            }
            return None;
        }
        let video = self.staged.clone()?;
        let segment_secs = self.segment_secs()?;
        self.phase = Phase::Uploading {
            sent: 0,
            total: video.size,
        };
        self.status = format!("Uploading {}", video.name);
        Some(Command::Split {
            video,
            segment_secs,
        })
    }

    pub fn request_clear(&mut self) -> Option<Command> {
        if self.busy() {
            return None;
        }
        self.phase = Phase::Clearing;
        self.status = "Clearing server files".to_string();
        Some(Command::Clear)
    }

    /// Puts the form back to its initial state.
    pub fn reset_form(&mut self) {
        self.staged = None;
        self.path_input.clear();
        self.segment_input = self.default_segment.to_string();
        self.phase = Phase::Idle;
    }

    pub fn handle_paste(&mut self, text: &str) -> Option<Command> {
        if self.alert.is_some() {
            return None;
        }
        self.focus = Focus::DropZone;
        self.stage_input(text)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if self.alert.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.alert = None;
            }
            return None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Some(Command::Quit),
            KeyCode::Char('c') if ctrl => return Some(Command::Quit),
            KeyCode::Char('s') if ctrl => return self.request_split(),
            KeyCode::Char('l') if ctrl => return self.request_clear(),
            KeyCode::F(5) => return Some(Command::Refresh),
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return None;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.previous();
                return None;
            }
            _ => {}
        }

        match self.focus {
            Focus::DropZone => match key.code {
                KeyCode::Char(c) if !ctrl => {
                    self.path_input.push(c);
                    None
                }
                KeyCode::Backspace => {
                    self.path_input.pop();
                    None
                }
                KeyCode::Enter => {
                    let raw = self.path_input.clone();
                    self.stage_input(&raw)
                }
                _ => None,
            },
            Focus::Segment => match key.code {
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    if self.segment_input.len() < SEGMENT_INPUT_MAX {
                        self.segment_input.push(c);
                    }
                    None
                }
                KeyCode::Backspace => {
                    self.segment_input.pop();
                    None
                }
                KeyCode::Enter => self.request_split(),
                _ => None,
            },
            Focus::Outputs => match key.code {
                KeyCode::Down => {
                    if !self.files.is_empty() {
                        self.selected = (self.selected + 1).min(self.files.len() - 1);
                    }
                    None
                }
                KeyCode::Up => {
                    self.selected = self.selected.saturating_sub(1);
                    None
                }
                KeyCode::Enter | KeyCode::Char('d') => {
                    self.files.get(self.selected).cloned().map(Command::Download)
                }
                _ => None,
            },
        }
    }

    pub fn apply(&mut self, update: Update) -> Option<Command> {
        match update {
            Update::DurationProbed { path, duration } => {
                if let Some(staged) = self.staged.as_mut().filter(|s| s.path == path) {
                    staged.duration = duration;
                }
                None
            }
            Update::Split(SplitProgress::Uploading { sent, total }) => {
                if matches!(self.phase, Phase::Uploading { .. }) {
                    self.phase = Phase::Uploading { sent, total };
                }
                None
            }
            Update::Split(SplitProgress::Processing(percent)) => {
                if matches!(self.phase, Phase::Uploading { .. } | Phase::Processing(_)) {
                    self.phase = Phase::Processing(percent);
                    self.status = format!("Processing: {percent}%");
                }
                None
            }
            Update::SplitFinished(Ok(())) => {
                self.phase = Phase::Idle;
                self.status = "Split complete".to_string();
                Some(Command::Refresh)
            }
            Update::SplitFinished(Err(message)) => {
                self.phase = Phase::Idle;
                self.status = "Split failed".to_string();
                self.alert = Some(format!("{SPLIT_FAILED}\n\n{message}"));
                None
            }
            Update::ClearFinished(Ok(())) => {
                self.reset_form();
                self.status = "Cleared".to_string();
                Some(Command::Refresh)
            }
            Update::ClearFinished(Err(message)) => {
                self.phase = Phase::Idle;
                self.status = "Clear failed".to_string();
                self.alert = Some(format!("{CLEAR_FAILED}\n\n{message}"));
                None
            }
            Update::Files(Ok(files)) => {
                self.files = files;
                self.selected = self.selected.min(self.files.len().saturating_sub(1));
                None
            }
            Update::Files(Err(message)) => {
                self.status = format!("Could not load output list: {message}");
                None
            }
            Update::Downloaded(Ok(path)) => {
                self.status = format!("Saved {}", path.display());
                None
            }
            Update::Downloaded(Err(message)) => {
                self.alert = Some(format!("Download failed\n\n{message}"));
                None
            }
        }
    }
}
