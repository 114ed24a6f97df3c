use std::io::{self, Write};
use std::time::Instant;

/// Elapsed-time stamped status lines on stderr.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn quiet() -> Self {
        Self::new(false)
    }

    fn emit(&self, line: std::fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {line}");
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(format_args!("{}", msg.as_ref()));
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.emit(format_args!("WARN {}", msg.as_ref()));
    }

    /// One line per pipeline stage, e.g. `[2/5] Ghost lines: removed 3`.
    pub fn stage(&self, current: usize, total: usize, label: &str, detail: impl AsRef<str>) {
        let total = total.max(1);
        let current = current.min(total);
        self.emit(format_args!(
            "[{current}/{total}] {label}: {}",
            detail.as_ref()
        ));
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
