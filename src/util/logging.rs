// NexusLIMS Logger - util/logging.rs
//
// Structured logging with runtime-selectable verbosity.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flags: -s (errors only), -v (info), -vv (debug), -vvv (trace)
//   - Config key: NEXUSLIMSGUI_LOG_LEVEL
//
// Output: stderr, teed into a bounded in-memory buffer that the GUI log
// window displays. Never logs passwords, tokens, or key material.

use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use super::constants::{DEFAULT_LOG_LEVEL, LOG_BUFFER_MAX_BYTES};

/// Map the CLI verbosity flags to a level name.
///
/// Returns `None` when no flag was given so the config level can apply.
pub fn level_for_flags(silent: bool, verbose: u8) -> Option<&'static str> {
    if silent {
        return Some("error");
    }
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Initialise the logging subsystem.
///
/// Priority: RUST_LOG env var > CLI flags > config level > default "warn".
pub fn init(cli_level: Option<&str>, config_level: Option<&str>, buffer: LogBuffer) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(level) = cli_level {
        EnvFilter::new(level)
    } else if let Some(level) = config_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(DEFAULT_LOG_LEVEL)
    };

    // The buffer is rendered as plain text, so colour codes stay off for both sinks.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr.and(buffer))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .compact()
        .init();

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        "Logging initialised"
    );
}

// =============================================================================
// In-memory log buffer
// =============================================================================

/// Shared, size-bounded text buffer receiving a copy of every log line.
///
/// Cloning yields another handle to the same buffer. When the buffer grows
/// past its limit the oldest whole lines are discarded.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    inner: Arc<Mutex<String>>,
    max_bytes: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(LOG_BUFFER_MAX_BYTES)
    }
}

impl LogBuffer {
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(String::new())),
            max_bytes,
        }
    }

    /// Copy of the current buffer contents.
    pub fn snapshot(&self) -> String {
        match self.inner.lock() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut text) = self.inner.lock() {
            text.clear();
        }
    }

    fn append(&self, bytes: &[u8]) {
        let Ok(mut text) = self.inner.lock() else {
            return;
        };
        text.push_str(&String::from_utf8_lossy(bytes));
        if text.len() > self.max_bytes {
            let excess = text.len() - self.max_bytes;
            let cut = line_cut(&text, excess);
            text.drain(..cut);
        }
    }
}

/// First line start at or after byte `excess`, or the end of `text`.
///
/// Works on bytes: `\n` never occurs inside a multi-byte character, so the
/// result is always a char boundary.
fn line_cut(text: &str, excess: usize) -> usize {
    let bytes = text.as_bytes();
    if excess == 0 || bytes.get(excess - 1) == Some(&b'\n') {
        return excess.min(bytes.len());
    }
    match bytes.get(excess..).and_then(|rest| rest.iter().position(|&b| b == b'\n')) {
        Some(pos) => excess + pos + 1,
        None => bytes.len(),
    }
}

/// Writer handed out per event by [`LogBuffer`].
pub struct LogBufferWriter {
    buffer: LogBuffer,
}

impl io::Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn verbosity_flags_map_to_levels() {
        assert_eq!(level_for_flags(false, 0), None);
        assert_eq!(level_for_flags(false, 1), Some("info"));
        assert_eq!(level_for_flags(false, 2), Some("debug"));
        assert_eq!(level_for_flags(false, 5), Some("trace"));
        assert_eq!(level_for_flags(true, 2), Some("error"));
    }

    #[test]
    fn buffer_collects_written_lines() {
        let buffer = LogBuffer::default();
        let mut w = buffer.make_writer();
        w.write_all(b"first line\n").unwrap();
        w.write_all(b"second line\n").unwrap();
        assert_eq!(buffer.snapshot(), "first line\nsecond line\n");
    }

    #[test]
    fn buffer_drops_oldest_whole_lines_when_full() {
        let buffer = LogBuffer::with_capacity(20);
        let mut w = buffer.make_writer();
        w.write_all(b"aaaaaaaaa\n").unwrap();
        w.write_all(b"bbbbbbbbb\n").unwrap();
        w.write_all(b"ccccccccc\n").unwrap();
        let text = buffer.snapshot();
        assert!(text.len() <= 20);
        assert!(!text.contains('a'));
        assert!(text.ends_with("ccccccccc\n"));
        assert!(text.starts_with('b'));
    }

    #[test]
    fn buffer_trim_never_splits_multibyte_characters() {
        let buffer = LogBuffer::with_capacity(10);
        let mut w = buffer.make_writer();
        w.write_all("éééééé\n".as_bytes()).unwrap();
        w.write_all("dir/données.dm3\n".as_bytes()).unwrap();
        w.write_all("ok\n".as_bytes()).unwrap();
        assert_eq!(buffer.snapshot(), "ok\n");
    }

    #[test]
    fn line_cut_keeps_a_line_starting_exactly_at_the_excess() {
        assert_eq!(line_cut("aa\nbb\n", 3), 3);
        assert_eq!(line_cut("aa\nbb\n", 1), 3);
        assert_eq!(line_cut("aa\nbb", 4), 5);
        assert_eq!(line_cut("aa\n", 0), 0);
    }

    #[test]
    fn clones_share_the_same_buffer() {
        let buffer = LogBuffer::default();
        let other = buffer.clone();
        other.make_writer().write_all(b"shared\n").unwrap();
        assert_eq!(buffer.snapshot(), "shared\n");
        buffer.clear();
        assert!(other.snapshot().is_empty());
    }
}
