use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use framecast_frame::FrameInfo;
use framecast_uploader::{
    EndReason, LifecycleEvent, LifecycleNotifier, LocalNotifier, Session, SessionConfig,
};
use tracing::{info, warn};

use crate::cmd::StreamArgs;
use crate::exit::{
    io_error, upload_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_summary, OutputFormat, StreamSummary};

/// Upper bound on waiting for the last accepted frame to finish sending.
const DRAIN_GRACE: Duration = Duration::from_secs(2);
const WAIT_STEP: Duration = Duration::from_millis(5);

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    if args.fps == 0 {
        return Err(CliError::new(USAGE, "--fps must be greater than zero"));
    }
    let image = fs::read(&args.file).map_err(|err| {
        io_error(&format!("failed reading {}", args.file.display()), err)
    })?;
    if image.is_empty() {
        return Err(CliError::new(
            USAGE,
            format!("{} is empty", args.file.display()),
        ));
    }
    let info = FrameInfo::new(args.width, args.height, args.orientation);

    let notifier = Arc::new(LocalNotifier::new());
    let config = SessionConfig {
        frame_stride: args.stride,
        ..SessionConfig::default()
    };
    let session = Session::new(&args.path, notifier.clone(), config)
        .map_err(|err| upload_error("session setup failed", err))?;
    session.on_end(|reason| {
        if let EndReason::StreamError(err) = reason {
            warn!(%err, "stream failed");
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), notifier.clone())?;

    session
        .start()
        .map_err(|err| upload_error("session start failed", err))?;
    if !wait_for_connect(&session, connect_timeout, &running) {
        session.finish();
        return Err(CliError::new(
            TIMEOUT,
            format!(
                "consumer not listening at {} after {:?}",
                args.path.display(),
                connect_timeout
            ),
        ));
    }

    let interval = Duration::from_secs(1) / args.fps;
    let mut next = Instant::now();
    for _ in 0..args.frames {
        if !running.load(Ordering::SeqCst) || session.end_reason().is_some() {
            break;
        }
        session.process_frame(&image, info);
        next += interval;
        if let Some(delay) = next.checked_duration_since(Instant::now()) {
            thread::sleep(delay);
        }
    }

    let deadline = Instant::now() + DRAIN_GRACE;
    while session.is_busy() && session.end_reason().is_none() && Instant::now() < deadline {
        thread::sleep(WAIT_STEP);
    }

    let frames_seen = session.frames_seen();
    let stats = session.stats();
    let reason = session.finish();
    info!(frames_seen, sent = stats.completed, "stream finished");

    print_summary(
        &StreamSummary::new(frames_seen, stats, reason.as_ref().map(ToString::to_string)),
        format,
    );

    match reason {
        Some(EndReason::StreamError(_)) => Ok(FAILURE),
        _ => Ok(SUCCESS),
    }
}

fn wait_for_connect(session: &Session, timeout: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + timeout;
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        if session.is_connected() {
            return true;
        }
        thread::sleep(WAIT_STEP);
    }
    session.is_connected()
}

/// Ctrl-C goes through the same stop request a host would send.
fn install_ctrlc_handler(running: Arc<AtomicBool>, notifier: Arc<LocalNotifier>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        notifier.publish(LifecycleEvent::StopRequested);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn connect_wait_times_out_without_consumer() {
        let path = format!(
            "/tmp/fccli-nowhere-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        let session = Session::new(
            path,
            Arc::new(LocalNotifier::new()),
            SessionConfig {
                connect_interval: Duration::from_millis(10),
                ..SessionConfig::default()
            },
        )
        .unwrap();
        session.start().unwrap();

        let running = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!wait_for_connect(&session, Duration::from_millis(50), &running));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
