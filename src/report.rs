//! Best-effort sinks for progress updates. None of these can fail a session:
//! errors are logged and dropped.

use std::env;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use kdam::{term, tqdm, Bar, BarExt};
use tracing::debug;

use crate::ffmpeg::progress::ProgressSnapshot;

pub const NOTIFICATION_ID: &str = "XV_COMPRESS_NOTIF";
const NOTIFY_PROGRAM: &str = "termux-notification";

pub trait ProgressReporter {
    fn report(&mut self, snapshot: &ProgressSnapshot);

    /// Called once when the encoder's output stream ends.
    fn finish(&mut self) {}
}

impl ProgressReporter for Vec<Box<dyn ProgressReporter>> {
    fn report(&mut self, snapshot: &ProgressSnapshot) {
        for reporter in self.iter_mut() {
            reporter.report(snapshot);
        }
    }

    fn finish(&mut self) {
        for reporter in self.iter_mut() {
            reporter.finish();
        }
    }
}

/// Progress bar on the terminal with the cleaned ffmpeg status as postfix.
pub struct ConsoleReporter {
    pbar: Option<Bar>,
    desc: String,
}

impl ConsoleReporter {
    pub fn new(desc: &str) -> Self {
        ConsoleReporter {
            pbar: None,
            desc: String::from(desc),
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&mut self, snapshot: &ProgressSnapshot) {
        let desc = &self.desc;
        let pbar = self.pbar.get_or_insert_with(|| {
            term::init(false);
            tqdm!(
                total = 100,
                desc = desc.clone(),
                position = 0,
                force_refresh = true
            )
        });
        pbar.set_postfix(snapshot.to_string());
        if let Err(err) = pbar.update_to(snapshot.percent_or_zero() as usize) {
            debug!(%err, "unable to draw progress bar");
        }
    }

    fn finish(&mut self) {
        if self.pbar.take().is_some() {
            eprintln!();
        }
    }
}

/// Puts percent and ETA in the terminal window title.
pub struct TitleReporter {
    file_name: String,
}

impl TitleReporter {
    pub fn new(file_name: &str) -> Self {
        TitleReporter { file_name: String::from(file_name) }
    }
}

impl ProgressReporter for TitleReporter {
    fn report(&mut self, snapshot: &ProgressSnapshot) {
        set_terminal_title(&format!(
            "{:.0}% - ETA {} - {}",
            snapshot.percent_or_zero(),
            snapshot.eta,
            self.file_name
        ));
    }
}

pub fn set_terminal_title(title: &str) {
    if let Err(err) = write_terminal_title(title) {
        debug!(%err, "unable to set terminal title");
    }
}

#[cfg(windows)]
fn write_terminal_title(title: &str) -> io::Result<()> {
    Command::new("cmd")
        .args(["/C", "title", &sanitize_title(title)])
        .status()
        .map(|_| ())
}

#[cfg(not(windows))]
fn write_terminal_title(title: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "\x1b]2;{}\x07", title)?;
    stdout.flush()
}

/// Characters `cmd` would interpret inside `title`.
#[cfg_attr(not(windows), allow(dead_code))]
fn sanitize_title(title: &str) -> String {
    title.replace('|', "-").replace('&', "and").replace('<', "[").replace('>', "]")
}

/// One Android (Termux) notification, updated in place by id. Does nothing
/// when the Termux API tools are not installed.
#[derive(Clone, Debug)]
pub struct NotificationHandle {
    id: String,
    available: bool,
}

impl NotificationHandle {
    pub fn new(id: &str) -> Self {
        let available = find_on_path(NOTIFY_PROGRAM, env::var_os("PATH").as_deref());
        debug!(available, "{} lookup", NOTIFY_PROGRAM);
        NotificationHandle { id: String::from(id), available }
    }

    /// Creates the notification, or replaces its text if it already exists.
    pub fn update(&self, title: &str, content: &str, ongoing: bool) {
        if !self.available {
            return;
        }
        let mut cmd = Command::new(NOTIFY_PROGRAM);
        cmd.args(["--id", &self.id, "--title", title, "--content", content, "--alert-once"]);
        if ongoing {
            cmd.args(["--priority", "high", "--ongoing"]);
        }
        run_quietly(&mut cmd);
    }

    pub fn clear(&self) {
        if !self.available {
            return;
        }
        run_quietly(Command::new("termux-notification-remove").arg(&self.id));
    }
}

fn find_on_path(program: &str, path: Option<&OsStr>) -> bool {
    match path {
        Some(path) => env::split_paths(path).any(|dir| is_program(&dir.join(program))),
        None => false,
    }
}

fn is_program(candidate: &Path) -> bool {
    candidate.is_file() || candidate.with_extension(env::consts::EXE_EXTENSION).is_file()
}

fn run_quietly(cmd: &mut Command) {
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = status {
        debug!(%err, ?cmd, "notification command failed");
    }
}

pub struct NotificationReporter {
    handle: NotificationHandle,
    original_mb: f64,
    estimated_mb: f64,
}

impl NotificationReporter {
    pub fn new(handle: NotificationHandle, original_mb: f64, estimated_mb: f64) -> Self {
        NotificationReporter {
            handle,
            original_mb,
            estimated_mb,
        }
    }

    fn content(&self, snapshot: &ProgressSnapshot) -> String {
        format!(
            "Prog: {:.1}% | ETA: {}\nOG: {:.0}MB -> Est: ~{:.0}MB",
            snapshot.percent_or_zero(),
            snapshot.eta,
            self.original_mb,
            self.estimated_mb
        )
    }
}

impl ProgressReporter for NotificationReporter {
    fn report(&mut self, snapshot: &ProgressSnapshot) {
        self.handle.update("Compressing Video...", &self.content(snapshot), true);
    }
}
