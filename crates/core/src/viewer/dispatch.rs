//! Table-driven routing from wire opcode to a typed [`Viewer`] handler.
//!
//! Each opcode has a minimum argument count; short argument lists are
//! logged and rejected without reaching a handler. Stream-bearing
//! opcodes resolve their stream index against the viewer's stream
//! tables, allocating the slot on first reference (`clipboard`, `file`,
//! `pipe`) and releasing it on `end`.

use std::sync::Arc;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::error::{CoreError, Result};
use crate::stream::StreamIndex;
use crate::viewer::Viewer;

fn require_argc(opcode: &str, argv: &[String], min: usize) -> Result<()> {
    if argv.len() < min {
        tracing::warn!(opcode, got = argv.len(), want = min, "short instruction");
        return Err(CoreError::Protocol(format!(
            "{opcode} requires at least {min} arguments, got {}",
            argv.len()
        )));
    }
    Ok(())
}

fn parse_i32(opcode: &str, field: &str, raw: &str) -> Result<i32> {
    raw.parse()
        .map_err(|_| CoreError::Protocol(format!("{opcode}: bad {field}: {raw:?}")))
}

fn parse_i64(opcode: &str, field: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| CoreError::Protocol(format!("{opcode}: bad {field}: {raw:?}")))
}

fn parse_u32(opcode: &str, field: &str, raw: &str) -> Result<u32> {
    raw.parse()
        .map_err(|_| CoreError::Protocol(format!("{opcode}: bad {field}: {raw:?}")))
}

fn parse_stream(opcode: &str, raw: &str) -> Result<StreamIndex> {
    parse_u32(opcode, "stream", raw).map(StreamIndex::new)
}

/// Routes one `(opcode, argv)` pair into the matching handler on
/// `viewer`'s capability object, if one is installed.
pub fn dispatch(viewer: &Arc<Viewer>, opcode: &str, argv: &[String]) -> Result<()> {
    match opcode {
        "mouse" => {
            require_argc(opcode, argv, 3)?;
            let x = parse_i32(opcode, "x", &argv[0])?;
            let y = parse_i32(opcode, "y", &argv[1])?;
            let mask = parse_u32(opcode, "mask", &argv[2])?;
            viewer.handlers().on_mouse(viewer, x, y, mask)
        }
        "key" => {
            require_argc(opcode, argv, 2)?;
            let keysym = parse_u32(opcode, "keysym", &argv[0])?;
            let pressed = parse_u32(opcode, "pressed", &argv[1])? != 0;
            viewer.handlers().on_key(viewer, keysym, pressed)
        }
        "size" => {
            require_argc(opcode, argv, 2)?;
            let width = parse_i32(opcode, "width", &argv[0])?;
            let height = parse_i32(opcode, "height", &argv[1])?;
            viewer.handlers().on_size(viewer, width, height)
        }
        "clipboard" => {
            require_argc(opcode, argv, 2)?;
            let stream = parse_stream(opcode, &argv[0])?;
            viewer.ensure_input_stream(stream);
            viewer.handlers().on_clipboard(viewer, stream, &argv[1])
        }
        "file" => {
            require_argc(opcode, argv, 3)?;
            let stream = parse_stream(opcode, &argv[0])?;
            viewer.ensure_input_stream(stream);
            viewer
                .handlers()
                .on_file(viewer, stream, &argv[1], &argv[2])
        }
        "pipe" => {
            require_argc(opcode, argv, 3)?;
            let stream = parse_stream(opcode, &argv[0])?;
            viewer.ensure_input_stream(stream);
            viewer
                .handlers()
                .on_pipe(viewer, stream, &argv[1], &argv[2])
        }
        "ack" => {
            require_argc(opcode, argv, 3)?;
            let stream = parse_stream(opcode, &argv[0])?;
            let status = parse_i32(opcode, "status", &argv[2])?;
            viewer.handlers().on_ack(viewer, stream, &argv[1], status)
        }
        "blob" => {
            require_argc(opcode, argv, 2)?;
            let stream = parse_stream(opcode, &argv[0])?;
            if !viewer.has_input_stream(stream) {
                return Err(CoreError::Protocol(format!(
                    "blob on unopened stream {stream}"
                )));
            }
            let data = BASE64_STANDARD
                .decode(&argv[1])
                .map_err(|e| CoreError::Protocol(format!("blob: bad base64: {e}")))?;
            viewer.handlers().on_blob(viewer, stream, &data)
        }
        "end" => {
            require_argc(opcode, argv, 1)?;
            let stream = parse_stream(opcode, &argv[0])?;
            viewer.free_stream(stream);
            viewer.handlers().on_end(viewer, stream)
        }
        "sync" => {
            require_argc(opcode, argv, 1)?;
            let timestamp = parse_i64(opcode, "timestamp", &argv[0])?;
            viewer.set_last_received_timestamp(timestamp);

            if viewer.state() == crate::viewer::ViewerState::Suspended
                && timestamp == viewer.last_sent_timestamp()
            {
                if let Some(session) = viewer.session() {
                    session.resume_viewer(viewer);
                }
            }

            viewer.handlers().on_sync(viewer, timestamp)
        }
        _ => {
            tracing::debug!(opcode, "unrecognized opcode, ignored");
            Ok(())
        }
    }
}
