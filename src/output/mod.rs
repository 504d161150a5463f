//! Human-facing console output.
//!
//! Diagnostics go through `tracing`; everything the operator is meant to read
//! (summaries, command lines, streamed test output) goes through a
//! [`ConsoleSink`].

use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use colored::{ColoredString, Colorize};

/// Destination for application text and streamed command output.
///
/// Writes are best effort; a broken terminal must not fail a verification.
pub trait ConsoleSink: Send + Sync {
    /// Application text such as summaries and progress notes.
    fn app(&self, text: &str);

    /// The command line about to be executed.
    fn command_line(&self, line: &str);

    /// A chunk of output from the running command.
    fn command_output(&self, bytes: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    App,
    Command,
}

struct PrinterState {
    out: Box<dyn Write + Send>,
    last: Block,
    at_line_start: bool,
}

/// Terminal printer: bold application text, colored command lines, dim
/// command output, and a blank line between blocks.
pub struct Printer {
    state: Mutex<PrinterState>,
    color: bool,
}

impl Printer {
    /// Prints to stdout, styled only when stdout is a terminal.
    pub fn stdout() -> Self {
        let color = io::stdout().is_terminal();
        if !color {
            colored::control::set_override(false);
        }
        Self::new(Box::new(io::stdout()), color)
    }

    pub fn new(out: Box<dyn Write + Send>, color: bool) -> Self {
        Self {
            state: Mutex::new(PrinterState {
                out,
                last: Block::None,
                at_line_start: true,
            }),
            color,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PrinterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn styled(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }
}

impl PrinterState {
    fn finish_line(&mut self) {
        if !self.at_line_start {
            let _ = self.out.write_all(b"\n");
            self.at_line_start = true;
        }
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        self.at_line_start = text.ends_with('\n');
    }
}

impl ConsoleSink for Printer {
    fn app(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.lock();
        state.finish_line();
        if state.last == Block::Command {
            state.write("\n");
        }
        let body = self.styled(text.trim_end_matches('\n'), |t| t.bold());
        state.write(&format!("{body}\n"));
        state.last = Block::App;
        let _ = state.out.flush();
    }

    fn command_line(&self, line: &str) {
        let mut state = self.lock();
        state.finish_line();
        if state.last != Block::None {
            state.write("\n");
        }
        let body = self.styled(line.trim_end_matches('\n'), |t| t.blue());
        state.write(&format!("{body}\n"));
        state.last = Block::Command;
        let _ = state.out.flush();
    }

    fn command_output(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(bytes);
        let mut state = self.lock();
        let styled = self.styled(&text, |t| t.dimmed());
        let _ = state.out.write_all(styled.as_bytes());
        state.at_line_start = text.ends_with('\n');
        state.last = Block::Command;
        let _ = state.out.flush();
    }
}

/// Records everything written to it.
#[derive(Debug, Default)]
pub struct CaptureSink {
    inner: Mutex<Captured>,
}

#[derive(Debug, Default)]
struct Captured {
    app: String,
    command_lines: Vec<String>,
    output: Vec<u8>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All application text, concatenated.
    pub fn app_text(&self) -> String {
        self.lock().app.clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.lock().command_lines.clone()
    }

    /// All command output bytes in arrival order.
    pub fn output(&self) -> Vec<u8> {
        self.lock().output.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConsoleSink for CaptureSink {
    fn app(&self, text: &str) {
        self.lock().app.push_str(text);
    }

    fn command_line(&self, line: &str) {
        self.lock().command_lines.push(line.to_string());
    }

    fn command_output(&self, bytes: &[u8]) {
        self.lock().output.extend_from_slice(bytes);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ConsoleSink for NullSink {
    fn app(&self, _text: &str) {}
    fn command_line(&self, _line: &str) {}
    fn command_output(&self, _bytes: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_printer_separates_blocks() {
        let buf = SharedBuf::default();
        let printer = Printer::new(Box::new(buf.clone()), false);

        printer.app("Setting up");
        printer.command_line("git clone x y");
        printer.command_output(b"Cloning...");
        printer.app("Done\n");

        assert_eq!(buf.text(), "Setting up\n\ngit clone x y\nCloning...\n\nDone\n");
    }

    #[test]
    fn test_printer_styles_when_colored() {
        colored::control::set_override(true);
        let buf = SharedBuf::default();
        let printer = Printer::new(Box::new(buf.clone()), true);
        printer.app("hi");
        printer.command_line("git status");
        let bold = "hi".bold().to_string();
        let blue = "git status".blue().to_string();
        colored::control::unset_override();

        let text = buf.text();
        assert!(bold.contains('\x1b'));
        assert!(text.starts_with(&format!("{bold}\n")), "{text:?}");
        assert!(text.contains(&blue), "{text:?}");
    }

    #[test]
    fn test_capture_sink_records() {
        let sink = CaptureSink::new();
        sink.app("a");
        sink.command_line("cmd");
        sink.command_output(b"xy");
        sink.command_output(b"z");
        assert_eq!(sink.app_text(), "a");
        assert_eq!(sink.command_lines(), vec!["cmd"]);
        assert_eq!(sink.output(), b"xyz");
    }
}
