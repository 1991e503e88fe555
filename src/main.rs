pub mod cancel;
pub mod encoders;
pub mod error;
pub mod estimate;
pub mod ffmpeg;
pub mod fstools;
pub mod presets;
pub mod report;
pub mod settings;

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use human_repr::HumanCount;
use rustop::opts;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cancel::CancellationToken;
use encoders::Encoder;
use error::CompressError;
use estimate::estimate_final_size;
use ffmpeg::FFmpeg;
use ffmpeg::probe::probe_video;
use ffmpeg::progress::format_seconds;
use ffmpeg::session::{EncodingSession, SessionOutcome};
use fstools::{checked_temp_path, classify_file, file_size_mb, generate_output_filename, DirEntryCategory};
use presets::SpeedPreset;
use report::{ConsoleReporter, NotificationHandle, NotificationReporter, ProgressReporter, TitleReporter, set_terminal_title, NOTIFICATION_ID};
use settings::{EncodingSettings, FrameRate, ScaleTarget};

const MAX_QUALITY: u8 = 51;
const EXIT_CANCELLED: u8 = 130;
const PROMPT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq)]
enum KeepAnswer {
    Keep,
    Delete,
    Cancelled,
}

struct Options {
    input: PathBuf,
    output: Option<PathBuf>,
    encoder: String,
    crf: u8,
    resolution: String,
    fps: String,
    preset: String,
    log: f64,
    desktop: bool,
    yes: bool,
}

fn main() -> ExitCode {
    init_logging();

    let (args, _rest) = opts! {
        synopsis "Shrink a video with ffmpeg, showing live progress and an estimated result size.";
        opt desktop:bool=false, desc:"Desktop mode: report progress in the window title instead of a mobile notification.";
        opt encoder:String=String::from("cpu"), desc:"Encoder type. [cpu, nvidia, amd, intel]";
        opt crf:u8=28, short:'q', desc:"CRF/QP quality value, 0-51. Lower is better and larger.";
        opt resolution:String=String::from("original"), desc:"Resolution: 1080p, 720p, 480p, original, or a scale expression such as 1280:-1.";
        opt fps:String=String::from("original"), desc:"Frame rate, e.g. 30, or original.";
        opt preset:String=String::from("medium"), desc:"Speed preset. [ultrafast, veryfast, fast, medium, slow, veryslow]";
        opt log:f64=0.5, desc:"Progress update interval in seconds (minimum 0.1).";
        opt yes:bool=false, desc:"Keep the result without asking.";
        param input:String, desc:"Input video file";
        param output:Option<String>, desc:"Output file (default: <input>_compressed.mp4)";
    }.parse_or_exit();

    let options = Options {
        input: PathBuf::from(&args.input),
        output: args.output.map(PathBuf::from),
        encoder: args.encoder,
        crf: args.crf,
        resolution: args.resolution,
        fps: args.fps,
        preset: args.preset,
        log: args.log,
        desktop: args.desktop || cfg!(windows),
        yes: args.yes,
    };

    match run(options) {
        Ok(code) => code,
        Err(err) => {
            println!("[!] {}", err);
            if let CompressError::ToolUnavailable { .. } = err {
                println!("    Please install ffmpeg using your package manager, or place ffmpeg and ffprobe next to this program.");
            }
            ExitCode::FAILURE
        },
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
}

fn run(options: Options) -> Result<ExitCode, CompressError> {
    let tools = FFmpeg::locate()?;

    match classify_file(&options.input) {
        DirEntryCategory::RegularFile => (),
        DirEntryCategory::DoesNotExist => return Err(CompressError::for_file(&options.input, "file does not exist.")),
        DirEntryCategory::Directory => return Err(CompressError::for_file(&options.input, "is a directory.")),
        DirEntryCategory::SymbolicLink | DirEntryCategory::Unknown => {
            return Err(CompressError::for_file(&options.input, "is not a regular file."))
        },
    }

    let settings = build_settings(&options, &tools)?;
    let original_mb = file_size_mb(&settings.source).unwrap_or(0.0);
    let estimated_mb = estimate_final_size(
        original_mb,
        settings.quality,
        settings.source_width,
        settings.resolution.as_ref(),
        settings.preset,
    );

    print_plan(&settings, original_mb, estimated_mb);

    let cancel = CancellationToken::new();
    if let Err(err) = cancel.install_signal_handlers(i32::from(EXIT_CANCELLED)) {
        warn!(%err, "unable to install signal handlers; Ctrl-C will not stop ffmpeg cleanly");
    }

    let notification = NotificationHandle::new(NOTIFICATION_ID);
    let mut reporters: Vec<Box<dyn ProgressReporter>> = vec![Box::new(ConsoleReporter::new("compressing"))];
    if options.desktop {
        reporters.push(Box::new(TitleReporter::new(&file_name(&settings.source))));
        set_terminal_title("Processing...");
    } else {
        reporters.push(Box::new(NotificationReporter::new(notification.clone(), original_mb, estimated_mb)));
    }

    let started = Instant::now();
    let mut session = EncodingSession::new(tools.ffmpeg.clone(), settings);
    let outcome = session.run(&mut reporters, &cancel);
    debug!(state = ?session.state(), "session finished");

    let code = match outcome {
        SessionOutcome::Succeeded(path) => report_success(&path, original_mb, started, &options, &notification, &cancel),
        SessionOutcome::Failed(err) => {
            println!("\n[!] Compression failed: {}", err);
            ExitCode::FAILURE
        },
        SessionOutcome::Cancelled => {
            println!("\n[!] Operation cancelled by user.");
            ExitCode::from(EXIT_CANCELLED)
        },
    };

    remove_temp_file(session.temp_path());
    if !options.desktop {
        notification.clear();
    }
    Ok(code)
}

fn build_settings(options: &Options, tools: &FFmpeg) -> Result<EncodingSettings, CompressError> {
    let encoder = Encoder::from_str(&options.encoder)
        .ok_or_else(|| CompressError::invalid("encoder", &format!("unknown encoder {:?}", options.encoder)))?;
    let preset = SpeedPreset::from_str(&options.preset)
        .ok_or_else(|| CompressError::invalid("preset", &format!("unknown preset {:?}", options.preset)))?;
    if options.crf > MAX_QUALITY {
        return Err(CompressError::invalid("crf", &format!("{} is not between 0 and {}", options.crf, MAX_QUALITY)));
    }
    if encoder.is_hardware() && preset != SpeedPreset::default() {
        warn!(%encoder, %preset, "hardware encoders use their own speed setting; the preset only affects the estimate");
    }
    if !options.log.is_finite() || options.log > settings::MAX_REPORT_INTERVAL {
        return Err(CompressError::invalid(
            "log",
            &format!("{} is not between {} and {} seconds", options.log, settings::MIN_REPORT_INTERVAL, settings::MAX_REPORT_INTERVAL),
        ));
    }
    if options.log < settings::MIN_REPORT_INTERVAL {
        warn!(interval = options.log, "report interval raised to {}s", settings::MIN_REPORT_INTERVAL);
    }

    let destination = match &options.output {
        Some(output) => output.clone(),
        None => generate_output_filename(&options.input),
    };
    let temp = checked_temp_path(&options.input, &destination)?;
    debug!(?temp, "working file");

    let metadata = probe_video(&tools.ffprobe, &options.input);
    println!("   [Info] {}", metadata);

    Ok(EncodingSettings::new(options.input.clone(), destination)
        .encoder(encoder)
        .quality(options.crf)
        .preset(preset)
        .resolution(ScaleTarget::from_str(&options.resolution))
        .fps(FrameRate::from_str(&options.fps))
        .duration(metadata.duration)
        .source_video(metadata.width, metadata.height, metadata.fps)
        .report_interval(options.log))
}

fn print_plan(settings: &EncodingSettings, original_mb: f64, estimated_mb: f64) {
    println!("\nStarting compression:");
    println!("  Encoder:    {}", settings.encoder);
    println!("  CRF/QP:     {}", settings.quality);
    println!("  Resolution: {}", settings.resolution_display());
    println!("  FPS:        {}", settings.fps_display());
    println!("  Preset:     {}", settings.preset);
    println!("  Log Update: Every {}s", settings.report_interval.as_secs_f64());
    println!("  Estimate:   OG {:.1} MB -> ~{:.1} MB", original_mb, estimated_mb);
    println!("  Output:     {}", settings.destination.display());
    println!("---");
}

fn report_success(
    path: &Path,
    original_mb: f64,
    started: Instant,
    options: &Options,
    notification: &NotificationHandle,
    cancel: &CancellationToken,
) -> ExitCode {
    let final_mb = file_size_mb(path).unwrap_or(0.0);
    let saved_mb = original_mb - final_mb;
    let saved_pct = match original_mb > 0.0 {
        true => saved_mb / original_mb * 100.0,
        false => 0.0,
    };

    println!("\nDone in {}", format_seconds(started.elapsed().as_secs_f64()));
    println!("Original: {}", mb_to_bytes(original_mb).human_count_bytes());
    println!("Result:   {}", mb_to_bytes(final_mb).human_count_bytes());
    println!("Saved:    {} ({:.2}%)", mb_to_bytes(saved_mb.max(0.0)).human_count_bytes(), saved_pct);

    if options.desktop {
        set_terminal_title(&format!("Done! Saved {:.0}%", saved_pct));
    } else {
        notification.update("Compression Complete", &format!("Saved {:.1}% ({:.1}MB)", saved_pct, final_mb), false);
    }

    if options.yes {
        println!("Auto-keeping file.");
        return ExitCode::SUCCESS;
    }
    match confirm_keep(BufReader::new(io::stdin()), cancel) {
        KeepAnswer::Keep => (),
        KeepAnswer::Delete => match fs::remove_file(path) {
            Ok(()) => println!("Deleted."),
            Err(err) => println!("[!] Could not delete {}: {}", path.display(), err),
        },
        KeepAnswer::Cancelled => {
            println!("\n[!] Operation cancelled by user. Keeping {}.", path.display());
            return ExitCode::from(EXIT_CANCELLED);
        },
    }
    ExitCode::SUCCESS
}

fn mb_to_bytes(mb: f64) -> u64 {
    (mb * 1024.0 * 1024.0) as u64
}

/// Asks until the answer is y or n. End of input keeps the file. A cancel
/// signal while waiting stops asking.
fn confirm_keep<R: BufRead + Send + 'static>(input: R, cancel: &CancellationToken) -> KeepAnswer {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in input.lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        print!("Keep file? (y/n): ");
        let _ = io::stdout().flush();
        let answer = loop {
            if cancel.is_cancelled() {
                return KeepAnswer::Cancelled;
            }
            match rx.recv_timeout(PROMPT_POLL) {
                Ok(Ok(answer)) => break answer,
                Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => return KeepAnswer::Keep,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        };
        match answer.trim().to_lowercase().as_str() {
            "y" => return KeepAnswer::Keep,
            "n" => return KeepAnswer::Delete,
            _ => continue,
        }
    }
}

fn remove_temp_file(temp: &Path) {
    if !temp.exists() {
        return;
    }
    match fs::remove_file(temp) {
        Ok(()) => {
            info!(?temp, "removed temp file");
            println!("[*] Temp file cleaned up.");
        },
        Err(err) => println!("[!] Warning: Could not remove temp file: {}", err),
    }
}

fn file_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            debug!(?path, "path has no file name");
            path.display().to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options(dir: &Path) -> Options {
        Options {
            input: dir.join("clip.mov"),
            output: None,
            encoder: String::from("cpu"),
            crf: 28,
            resolution: String::from("original"),
            fps: String::from("original"),
            preset: String::from("medium"),
            log: 0.5,
            desktop: true,
            yes: true,
        }
    }

    fn missing_tools(dir: &Path) -> FFmpeg {
        FFmpeg {
            ffmpeg: dir.join("no-ffmpeg"),
            ffprobe: dir.join("no-ffprobe"),
        }
    }

    fn invalid_name(result: Result<EncodingSettings, CompressError>) -> &'static str {
        match result {
            Err(CompressError::InvalidArgument { name, .. }) => name,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_settings_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.mov"), b"video").unwrap();
        let settings = build_settings(&options(dir.path()), &missing_tools(dir.path())).unwrap();
        assert_eq!(settings.destination, dir.path().join("clip_compressed.mp4"));
        assert_eq!(settings.report_interval, Duration::from_millis(500));
        assert_eq!(settings.duration, 0.0);
    }

    #[test]
    fn test_unusable_log_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for log in [f64::INFINITY, f64::NAN, 1e30] {
            let mut opts = options(dir.path());
            opts.log = log;
            assert_eq!(invalid_name(build_settings(&opts, &missing_tools(dir.path()))), "log");
        }
    }

    #[test]
    fn test_output_named_like_working_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.mov"), b"video").unwrap();
        let mut opts = options(dir.path());
        opts.output = Some(dir.path().join(fstools::TEMP_FILE_NAME));
        assert_eq!(invalid_name(build_settings(&opts, &missing_tools(dir.path()))), "output");
    }

    #[test]
    fn test_input_named_like_working_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.input = dir.path().join(fstools::TEMP_FILE_NAME);
        fs::write(&opts.input, b"video").unwrap();
        match build_settings(&opts, &missing_tools(dir.path())) {
            Err(CompressError::InputParse { path, .. }) => assert_eq!(path, opts.input),
            other => panic!("unexpected {other:?}"),
        }
        assert!(opts.input.exists());
    }

    #[test]
    fn test_bad_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.encoder = String::from("voodoo");
        assert_eq!(invalid_name(build_settings(&opts, &missing_tools(dir.path()))), "encoder");
        let mut opts = options(dir.path());
        opts.preset = String::from("placebo");
        assert_eq!(invalid_name(build_settings(&opts, &missing_tools(dir.path()))), "preset");
        let mut opts = options(dir.path());
        opts.crf = 52;
        assert_eq!(invalid_name(build_settings(&opts, &missing_tools(dir.path()))), "crf");
    }

    #[test]
    fn test_confirm_keep_answers() {
        let cancel = CancellationToken::new();
        assert_eq!(confirm_keep(Cursor::new("y\n"), &cancel), KeepAnswer::Keep);
        assert_eq!(confirm_keep(Cursor::new("maybe\n N \n"), &cancel), KeepAnswer::Delete);
        assert_eq!(confirm_keep(Cursor::new(""), &cancel), KeepAnswer::Keep);
    }

    #[test]
    fn test_confirm_keep_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(confirm_keep(Cursor::new("n\n"), &cancel), KeepAnswer::Cancelled);
    }
}
