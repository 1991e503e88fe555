use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::error::SessionError;
use crate::fstools::temp_output_path;
use crate::report::ProgressReporter;
use crate::settings::EncodingSettings;
use super::parameter_factories::{create_parameter_factory, video_filter};
use super::progress::{parse_progress_line, ParsedLine};
use super::throttle::ProgressThrottle;

/// How long to wait for a stderr line before looking at the cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionState {
    Building,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// Holds the final destination the encoded file was moved to.
    Succeeded(PathBuf),
    Failed(SessionError),
    Cancelled,
}

impl SessionOutcome {
    fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Succeeded(_) => SessionState::Succeeded,
            SessionOutcome::Failed(_) => SessionState::Failed,
            SessionOutcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// One run of the encoder over one file.
///
/// The encoder writes to a temporary file beside the destination. Only a zero
/// exit status promotes it, with a single rename; every other ending leaves the
/// destination untouched and the temporary file for the caller to clean up.
pub struct EncodingSession {
    program: PathBuf,
    settings: EncodingSettings,
    temp_path: PathBuf,
    state: SessionState,
    outcome: Option<SessionOutcome>,
}

impl EncodingSession {
    pub fn new(program: PathBuf, settings: EncodingSettings) -> Self {
        let temp_path = temp_output_path(&settings.destination);
        EncodingSession {
            program,
            settings,
            temp_path,
            state: SessionState::Building,
            outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn build_args(&self) -> Vec<PathBuf> {
        let mut args = vec![
            PathBuf::from("-y"),
            PathBuf::from("-i"), self.settings.source.clone(),
            PathBuf::from("-loglevel"), PathBuf::from("verbose"),
        ];

        args.append(&mut create_parameter_factory(&self.settings).parameters());

        args.push(PathBuf::from("-c:a"));
        args.push(PathBuf::from("aac"));
        args.push(PathBuf::from("-b:a"));
        args.push(PathBuf::from("128k"));

        if let Some(filter) = video_filter(&self.settings) {
            args.push(PathBuf::from("-vf"));
            args.push(PathBuf::from(filter));
        }

        args.push(self.temp_path.clone());
        args
    }

    /// Runs the encoder to completion, failure or cancellation. A session only
    /// runs once; later calls return the same outcome.
    pub fn run(&mut self, reporter: &mut dyn ProgressReporter, cancel: &CancellationToken) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = self.execute(reporter, cancel);
        self.state = outcome.state();
        match &outcome {
            SessionOutcome::Succeeded(path) => info!(?path, "encoding succeeded"),
            SessionOutcome::Failed(err) => warn!(%err, "encoding failed"),
            SessionOutcome::Cancelled => info!("encoding cancelled"),
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn execute(&mut self, reporter: &mut dyn ProgressReporter, cancel: &CancellationToken) -> SessionOutcome {
        let args = self.build_args();
        debug!("{:?} {}", self.program, args.iter().map(|s| format!("{:?}", s)).collect::<Vec<String>>().join(" "));

        let mut child = match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn() {
            Ok(child) => child,
            Err(err) => return SessionOutcome::Failed(SessionError::Spawn {
                program: self.program.clone(),
                msg: err.to_string(),
            }),
        };

        self.state = SessionState::Running;
        info!(pid = child.id(), temp = ?self.temp_path, "encoder started");

        let stderr = match child.stderr.take() {
            Some(stderr) => stderr,
            None => {
                stop_child(&mut child);
                return SessionOutcome::Failed(SessionError::Spawn {
                    program: self.program.clone(),
                    msg: String::from("stderr was not captured"),
                });
            },
        };

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || forward_lines(stderr, tx));
        let started = Instant::now();
        let mut throttle = ProgressThrottle::new(self.settings.report_interval);
        debug!(interval = ?throttle.interval(), duration = self.settings.duration, "reading encoder progress");

        loop {
            if cancel.is_cancelled() {
                info!(pid = child.id(), "cancellation requested; killing encoder");
                stop_child(&mut child);
                reporter.finish();
                return SessionOutcome::Cancelled;
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    let now = Instant::now();
                    match parse_progress_line(&line, self.settings.duration, now.duration_since(started)) {
                        ParsedLine::NotProgress => trace!(%line, "encoder output"),
                        ParsedLine::Progress(snapshot) => {
                            trace!(percent = ?snapshot.percent, position = ?snapshot.position, size = ?snapshot.size, "progress");
                            if throttle.should_emit(now) {
                                reporter.report(&snapshot);
                            }
                        },
                    }
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        reporter.finish();
        if reader.join().is_err() {
            debug!("stderr reader panicked");
        }

        let status = child.wait();
        if cancel.is_cancelled() {
            return SessionOutcome::Cancelled;
        }

        match status {
            Ok(status) if status.success() => self.finalize(),
            Ok(status) => match status.code() {
                Some(code) => SessionOutcome::Failed(SessionError::Exit(code)),
                None => SessionOutcome::Failed(SessionError::Terminated),
            },
            Err(err) => SessionOutcome::Failed(SessionError::Wait(err.to_string())),
        }
    }

    fn finalize(&self) -> SessionOutcome {
        let destination = &self.settings.destination;
        match fs::rename(&self.temp_path, destination) {
            Ok(()) => {
                debug!(from = ?self.temp_path, to = ?destination, "moved encoded file into place");
                SessionOutcome::Succeeded(destination.clone())
            },
            Err(err) => SessionOutcome::Failed(SessionError::Finalize {
                from: self.temp_path.clone(),
                to: destination.clone(),
                msg: err.to_string(),
            }),
        }
    }
}

/// Kills and reaps the encoder so no zombie is left behind.
fn stop_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(pid = child.id(), %err, "error killing encoder process");
    }
    if let Err(err) = child.wait() {
        debug!(pid = child.id(), %err, "error waiting for encoder process");
    }
}

/// Sends every line of `stream` to `tx`. ffmpeg ends its status lines with
/// `\r`, so both `\r` and `\n` terminate a line. Returns at end of stream or
/// once the receiver is gone.
fn forward_lines<R: Read>(stream: R, tx: Sender<String>) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(%err, "error reading encoder stderr");
                break;
            },
        };
        if buf.is_empty() {
            break;
        }
        let (consumed, terminated) = match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(i) => {
                line.extend_from_slice(&buf[..i]);
                (i + 1, true)
            },
            None => {
                line.extend_from_slice(buf);
                (buf.len(), false)
            },
        };
        reader.consume(consumed);
        if terminated && !send_line(&mut line, &tx) {
            return;
        }
    }
    send_line(&mut line, &tx);
}

fn send_line(line: &mut Vec<u8>, tx: &Sender<String>) -> bool {
    if line.is_empty() {
        return true;
    }
    let text = String::from_utf8_lossy(line).into_owned();
    line.clear();
    tx.send(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::Encoder;
    use crate::ffmpeg::progress::ProgressSnapshot;
    use crate::presets::SpeedPreset;
    use crate::settings::{FrameRate, ScaleTarget};

    #[derive(Default)]
    struct RecordingReporter {
        snapshots: Vec<ProgressSnapshot>,
        finished: usize,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&mut self, snapshot: &ProgressSnapshot) {
            self.snapshots.push(snapshot.clone());
        }

        fn finish(&mut self) {
            self.finished += 1;
        }
    }

    fn settings(dir: &Path) -> EncodingSettings {
        EncodingSettings::new(dir.join("input.mov"), dir.join("output.mp4"))
            .duration(4.0)
            .report_interval(0.1)
    }

    fn strings(args: &[PathBuf]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_build_args_software() {
        let settings = EncodingSettings::new(PathBuf::from("/videos/in.mov"), PathBuf::from("/videos/out.mp4"))
            .quality(28)
            .preset(SpeedPreset::Fast);
        let session = EncodingSession::new(PathBuf::from("ffmpeg"), settings);
        assert_eq!(strings(&session.build_args()), vec![
            "-y", "-i", "/videos/in.mov", "-loglevel", "verbose",
            "-c:v", "libx264", "-crf", "28", "-preset", "fast",
            "-c:a", "aac", "-b:a", "128k",
            "/videos/temp_ffmpeg_output.mp4",
        ]);
    }

    #[test]
    fn test_build_args_hardware_with_filters() {
        let settings = EncodingSettings::new(PathBuf::from("in.mov"), PathBuf::from("out/out.mp4"))
            .encoder(Encoder::Amd)
            .quality(30)
            .resolution(ScaleTarget::from_str("480p"))
            .fps(Some(FrameRate(25.0)));
        let session = EncodingSession::new(PathBuf::from("ffmpeg"), settings);
        assert_eq!(strings(&session.build_args()), vec![
            "-y", "-i", "in.mov", "-loglevel", "verbose",
            "-c:v", "h264_amf", "-rc", "cqp", "-qp_i", "30", "-qp_p", "30", "-quality", "balanced",
            "-c:a", "aac", "-b:a", "128k",
            "-vf", "scale=854:-1,fps=25",
            "out/temp_ffmpeg_output.mp4",
        ]);
    }

    #[test]
    fn test_temp_path_differs_from_destination() {
        let session = EncodingSession::new(PathBuf::from("ffmpeg"), settings(Path::new("/tmp/x")));
        assert_ne!(session.temp_path(), Path::new("/tmp/x/output.mp4"));
        assert_eq!(session.state(), SessionState::Building);
    }

    #[test]
    fn test_forward_lines_splits_on_carriage_return() {
        let input: &[u8] = b"header\nframe=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r\nlast";
        let (tx, rx) = mpsc::channel();
        forward_lines(input, tx);
        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(lines, vec!["header", "frame=1 time=00:00:01.00", "frame=2 time=00:00:02.00", "last"]);
    }

    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = EncodingSession::new(dir.path().join("no-such-encoder"), settings(dir.path()));
        let mut reporter = RecordingReporter::default();
        match session.run(&mut reporter, &CancellationToken::new()) {
            SessionOutcome::Failed(SessionError::Spawn { .. }) => (),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Failed);
        assert!(reporter.snapshots.is_empty());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::{Mutex, MutexGuard};

        // Forking while another test still holds a freshly written script open
        // makes exec fail with ETXTBSY.
        static SCRIPTS: Mutex<()> = Mutex::new(());

        fn lock() -> MutexGuard<'static, ()> {
            SCRIPTS.lock().unwrap_or_else(|e| e.into_inner())
        }

        const PROGRESS: &str = r#"
printf 'ffmpeg version n7.0 Copyright (c) 2000-2024\n' >&2
printf 'frame=   30 fps=0.0 q=28.0 size=     256KiB time=00:00:01.00 bitrate=2097.2kbits/s speed=2x\r' >&2
printf 'frame=   60 fps= 58 q=28.0 size=     512KiB time=00:00:02.00 bitrate=2097.2kbits/s speed=2x\r' >&2
"#;

        fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            let script = format!("#!/bin/sh\nfor last; do :; done\n{}{}\n", PROGRESS, body);
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_success_moves_temp_file() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let program = fake_encoder(dir.path(), "printf 'encoded' > \"$last\"");
            let mut session = EncodingSession::new(program, settings(dir.path()));
            let temp = session.temp_path().to_path_buf();
            let mut reporter = RecordingReporter::default();

            let outcome = session.run(&mut reporter, &CancellationToken::new());

            assert_eq!(outcome, SessionOutcome::Succeeded(dir.path().join("output.mp4")));
            assert_eq!(session.state(), SessionState::Succeeded);
            assert!(!temp.exists());
            assert_eq!(fs::read_to_string(dir.path().join("output.mp4")).unwrap(), "encoded");
            assert!(!reporter.snapshots.is_empty());
            assert_eq!(reporter.snapshots[0].percent, Some(25.0));
            assert_eq!(reporter.snapshots[0].size.as_deref(), Some("256.00KB"));
            assert_eq!(reporter.finished, 1);
        }

        #[test]
        fn test_outcome_is_absorbing() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let program = fake_encoder(dir.path(), "printf 'encoded' > \"$last\"");
            let mut session = EncodingSession::new(program, settings(dir.path()));
            let mut reporter = RecordingReporter::default();
            let first = session.run(&mut reporter, &CancellationToken::new());
            let reported = reporter.snapshots.len();
            let second = session.run(&mut reporter, &CancellationToken::new());
            assert_eq!(first, second);
            assert_eq!(reporter.snapshots.len(), reported);
        }

        #[test]
        fn test_nonzero_exit() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let program = fake_encoder(dir.path(), "printf 'partial' > \"$last\"\nexit 3");
            let mut session = EncodingSession::new(program, settings(dir.path()));
            let outcome = session.run(&mut RecordingReporter::default(), &CancellationToken::new());
            assert_eq!(outcome, SessionOutcome::Failed(SessionError::Exit(3)));
            assert!(!dir.path().join("output.mp4").exists());
            assert!(session.temp_path().exists());
        }

        #[test]
        fn test_missing_temp_file_fails_finalize() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let program = fake_encoder(dir.path(), "exit 0");
            let mut session = EncodingSession::new(program, settings(dir.path()));
            match session.run(&mut RecordingReporter::default(), &CancellationToken::new()) {
                SessionOutcome::Failed(SessionError::Finalize { .. }) => (),
                other => panic!("unexpected outcome {other:?}"),
            }
            assert!(!dir.path().join("output.mp4").exists());
        }

        #[test]
        fn test_cancel_kills_running_encoder() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let program = fake_encoder(dir.path(), "printf 'partial' > \"$last\"\nexec sleep 30");
            let mut session = EncodingSession::new(program, settings(dir.path()));
            let cancel = CancellationToken::new();
            let canceller = {
                let cancel = cancel.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(500));
                    cancel.cancel();
                })
            };

            let started = Instant::now();
            let mut reporter = RecordingReporter::default();
            let outcome = session.run(&mut reporter, &cancel);
            canceller.join().unwrap();

            assert_eq!(outcome, SessionOutcome::Cancelled);
            assert_eq!(session.state(), SessionState::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(!dir.path().join("output.mp4").exists());
            assert_eq!(reporter.finished, 1);
        }

        #[test]
        fn test_cancelled_before_start() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let program = fake_encoder(dir.path(), "exec sleep 30");
            let mut session = EncodingSession::new(program, settings(dir.path()));
            let cancel = CancellationToken::new();
            cancel.cancel();
            let started = Instant::now();
            assert_eq!(session.run(&mut RecordingReporter::default(), &cancel), SessionOutcome::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
