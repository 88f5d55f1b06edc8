use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framecast_frame::{FrameConfig, FrameError, FrameReader};
use framecast_transport::EndpointListener;
use tracing::info;

use crate::cmd::ListenArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

/// How often a blocked read wakes up to check for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        EndpointListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = ?listener.path(), "waiting for producer");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    info!("producer connected");

    let config = FrameConfig {
        read_timeout: Some(POLL_INTERVAL),
        ..FrameConfig::default()
    };
    let mut reader = FrameReader::with_config_socket(stream, config)
        .map_err(|err| frame_error("socket setup failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                info!(frames = printed, "producer disconnected");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        printed = printed.saturating_add(1);
        print_frame(printed, &frame, format);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
