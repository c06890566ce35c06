//! Cosmetic terminal effects. Write errors are ignored and nothing here
//! may change the outcome of the operation it decorates.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub const SPINNER_TICK: Duration = Duration::from_millis(100);
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
pub const BLINK: Duration = Duration::from_millis(500);

/// Redraws the current line until [`Spinner::finish`] (or drop).
pub struct Spinner {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start(label: impl Into<String>) -> Self {
        Self::start_with(io::stdout(), label, SPINNER_TICK)
    }

    /// A spinner that draws nothing, for `--no-animation` and tests.
    pub fn disabled() -> Self {
        Self {
            stop: None,
            handle: None,
        }
    }

    pub fn start_with<W>(mut out: W, label: impl Into<String>, tick: Duration) -> Self
    where
        W: Write + Send + 'static,
    {
        let label = label.into();
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let mut frame = 0usize;
            loop {
                let glyph = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
                let _ = write!(out, "\r{glyph} {label}");
                let _ = out.flush();
                frame = frame.wrapping_add(1);
                match stopped.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let blank = " ".repeat(label.chars().count() + 2);
            let _ = write!(out, "\r{blank}\r");
            let _ = out.flush();
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn finish(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}

pub fn format_mm_ss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Counts `secs` down to `00:00`, one step per `tick`. Returns false when
/// `interrupted` was raised before the end.
pub fn countdown<W: Write>(
    out: &mut W,
    label: &str,
    secs: u64,
    tick: Duration,
    interrupted: &AtomicBool,
) -> bool {
    for remaining in (0..=secs).rev() {
        if interrupted.load(Ordering::SeqCst) {
            let _ = writeln!(out);
            return false;
        }
        let _ = write!(out, "\r⏳ {label} {}", format_mm_ss(remaining));
        let _ = out.flush();
        if remaining > 0 {
            thread::sleep(tick);
        }
    }
    let _ = writeln!(out);
    true
}

pub fn completion_flourish<W: Write>(out: &mut W, blink: Duration) {
    let border = "🎉".repeat(20);
    let _ = writeln!(out, "\n{border}");
    let _ = writeln!(out, "🎉{:^46}🎉", "");
    let _ = writeln!(out, "🎉{:^46}🎉", "PROPOSAL COMPLETED!");
    let _ = writeln!(out, "🎉{:^46}🎉", "");
    let _ = writeln!(out, "{border}");
    for _ in 0..5 {
        let _ = write!(out, "\r🎉 PROPOSAL COMPLETED! 🎉");
        let _ = out.flush();
        thread::sleep(blink);
        let _ = write!(out, "\r{:30}", "");
        let _ = out.flush();
        thread::sleep(blink);
    }
    let _ = writeln!(out, "\r🎉 PROPOSAL COMPLETED! 🎉");
}
