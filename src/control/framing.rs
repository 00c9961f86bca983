//! Application-mode protocol state machine.
//!
//! The shell integration multiplexes control sequences into the terminal
//! stream: a start marker carrying `[cookie, subcode, extra...]` parameters,
//! free-form payload data, then an end marker. The emulator splits those out
//! and feeds them here; on the end marker the machine yields the action the
//! completed sequence stands for. Every sequence is authenticated by the
//! per-session cookie; a wrong or missing cookie drops the whole sequence.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::warn;

use crate::config::NoFrameRules;
use crate::control::show_file::{self, FileMetadata};

// Wire subcodes, fixed by the shell integration scripts.
const SUBCODE_BRACKET_START: &str = "2";
const SUBCODE_BRACKET_END: &str = "3";
const SUBCODE_REQUEST_FRAME: &str = "4";
const SUBCODE_SHOW_FILE: &str = "5";

/// What a completed control sequence asks the surface to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// A command classified for framing started; open a frame for it.
    OpenFrame { command_line: String },
    /// A no-frame command started; remember where its output begins so it
    /// can still be framed retroactively on failure.
    TrackCommand { command_line: String },
    /// The foreground command finished with this return code.
    CloseFrame { return_code: String },
    /// Re-emit a frame's contents down the pty.
    RequestFrame { tag: String },
    /// Display a downloaded file.
    ShowFile {
        metadata: FileMetadata,
        bytes: Vec<u8>,
    },
}

/// Payload currently being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CaptureMode {
    Idle,
    BracketStart { bracket_style: Option<String> },
    BracketEnd,
    RequestFrame,
    ShowFile { metadata_size: String },
}

pub struct FramingStateMachine {
    cookie: String,
    rules: NoFrameRules,
    mode: CaptureMode,
    buffer: String,
}

impl FramingStateMachine {
    pub fn new(cookie: impl Into<String>, rules: NoFrameRules) -> Self {
        Self {
            cookie: cookie.into(),
            rules,
            mode: CaptureMode::Idle,
            buffer: String::new(),
        }
    }

    /// Begin a control sequence. `params` is `[cookie, subcode, extra...]`.
    pub fn handle_start(&mut self, params: &[&str]) {
        self.buffer.clear();

        let Some(cookie) = params.first() else {
            warn!("application mode sequence with no parameters");
            return;
        };
        if *cookie != self.cookie {
            warn!("wrong cookie at the start of an application mode sequence");
            return;
        }

        let Some(subcode) = params.get(1) else {
            warn!("application mode sequence without a subcode");
            return;
        };
        self.mode = match *subcode {
            SUBCODE_BRACKET_START => CaptureMode::BracketStart {
                bracket_style: params.get(2).map(|style| style.to_string()),
            },
            SUBCODE_BRACKET_END => CaptureMode::BracketEnd,
            SUBCODE_REQUEST_FRAME => CaptureMode::RequestFrame,
            SUBCODE_SHOW_FILE => CaptureMode::ShowFile {
                metadata_size: params.get(2).unwrap_or(&"").to_string(),
            },
            _ => {
                warn!(subcode = %subcode, "unrecognized application mode subcode");
                CaptureMode::Idle
            }
        };
    }

    /// Accumulate payload text for the sequence in progress. Data outside a
    /// sequence is dropped.
    pub fn handle_data(&mut self, data: &str) {
        if self.mode != CaptureMode::Idle {
            self.buffer.push_str(data);
        }
    }

    /// Finish the sequence in progress and yield its action, if any.
    pub fn handle_end(&mut self) -> Option<ControlAction> {
        let mode = std::mem::replace(&mut self.mode, CaptureMode::Idle);
        let buffer = std::mem::take(&mut self.buffer);

        match mode {
            CaptureMode::Idle => None,
            CaptureMode::BracketStart { bracket_style } => {
                let command_line = clean_command_line(&buffer, bracket_style.as_deref());
                if self.rules.is_no_frame(&command_line) {
                    Some(ControlAction::TrackCommand { command_line })
                } else {
                    Some(ControlAction::OpenFrame { command_line })
                }
            }
            CaptureMode::BracketEnd => Some(ControlAction::CloseFrame {
                return_code: buffer.trim().to_string(),
            }),
            CaptureMode::RequestFrame => Some(ControlAction::RequestFrame {
                tag: buffer.trim().to_string(),
            }),
            CaptureMode::ShowFile { metadata_size } => {
                match show_file::decode_show_file(&buffer, &metadata_size) {
                    Ok((metadata, bytes)) => Some(ControlAction::ShowFile { metadata, bytes }),
                    Err(error) => {
                        warn!(%error, "corrupt show-file control sequence");
                        None
                    }
                }
            }
        }
    }
}

/// The bash bracket style prepends the history number to the captured
/// command line; strip it.
fn clean_command_line(raw: &str, bracket_style: Option<&str>) -> String {
    if bracket_style == Some("bash") {
        let trimmed = raw.trim();
        match trimmed.find(' ') {
            Some(space) => trimmed[space..].trim().to_string(),
            None => String::new(),
        }
    } else {
        raw.to_string()
    }
}

/// Encode frame contents for re-emission down the pty: each line base64
/// encoded on its own `#` prefixed line, closed off with the `#;0`
/// terminator.
pub fn encode_frame_contents(lines: &[String]) -> String {
    let mut encoded = String::new();
    for line in lines {
        encoded.push('#');
        encoded.push_str(&BASE64.encode(format!("{line}\n")));
        encoded.push('\n');
    }
    encoded.push_str("#;0\n");
    encoded
}
