use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framecast_frame::Frame;
use framecast_uploader::UploaderStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput {
    index: usize,
    width: u32,
    height: u32,
    orientation: u32,
    payload_size: usize,
    wire_size: usize,
    timestamp: String,
}

impl FrameOutput {
    fn new(index: usize, frame: &Frame) -> Self {
        let info = frame.info();
        Self {
            index,
            width: info.width,
            height: info.height,
            orientation: info.orientation,
            payload_size: frame.payload.len(),
            wire_size: frame.wire_size(),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_frame(index: usize, frame: &Frame, format: OutputFormat) {
    let out = FrameOutput::new(index, frame);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "WIDTH", "HEIGHT", "ORIENTATION", "SIZE"])
                .add_row(vec![
                    out.index.to_string(),
                    out.width.to_string(),
                    out.height.to_string(),
                    out.orientation.to_string(),
                    out.payload_size.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "frame={} size={}x{} orientation={} bytes={}",
                out.index, out.width, out.height, out.orientation, out.payload_size
            );
        }
    }
}

/// Outcome of a `stream` run.
#[derive(Serialize)]
pub struct StreamSummary {
    pub frames_seen: u64,
    pub accepted: u64,
    pub dropped_busy: u64,
    pub dropped_not_ready: u64,
    pub dropped_encode: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub end_reason: Option<String>,
}

impl StreamSummary {
    pub fn new(frames_seen: u64, stats: UploaderStats, end_reason: Option<String>) -> Self {
        Self {
            frames_seen,
            accepted: stats.accepted,
            dropped_busy: stats.dropped_busy,
            dropped_not_ready: stats.dropped_not_ready,
            dropped_encode: stats.dropped_encode,
            completed: stats.completed,
            abandoned: stats.abandoned,
            end_reason,
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("frames_seen", self.frames_seen.to_string()),
            ("accepted", self.accepted.to_string()),
            ("dropped_busy", self.dropped_busy.to_string()),
            ("dropped_not_ready", self.dropped_not_ready.to_string()),
            ("dropped_encode", self.dropped_encode.to_string()),
            ("completed", self.completed.to_string()),
            ("abandoned", self.abandoned.to_string()),
            (
                "end_reason",
                self.end_reason.clone().unwrap_or_else(|| "-".to_string()),
            ),
        ]
    }
}

pub fn print_summary(summary: &StreamSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"]);
            for (name, value) in summary.rows() {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = summary
                .rows()
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
