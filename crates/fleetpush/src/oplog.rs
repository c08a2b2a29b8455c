//! The operator log
//!
//! The colorized narrative an operator watches, mirrored verbatim (minus
//! color) into a per-push log file. Also serves as the exec layer's output
//! mirror for streamed remote command output.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossterm::style::{Color, Stylize};

/// Console + file sink for the push narrative
pub struct OpLog {
    log_path: PathBuf,
    file: Mutex<File>,
    quiet: bool,
}

impl OpLog {
    /// Create the log file as `<timestamp>-<push_id>.log` under `log_root`
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be created.
    pub fn open(log_root: &Path, push_id: &str, quiet: bool) -> eyre::Result<Self> {
        std::fs::create_dir_all(log_root)
            .map_err(|e| eyre::eyre!("{}: {e}", log_root.display()))?;

        let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H:%M:%S");
        let log_path = log_root.join(format!("{timestamp}-{push_id}.log"));
        let file = File::create(&log_path)
            .map_err(|e| eyre::eyre!("{}: {e}", log_path.display()))?;

        Ok(Self {
            log_path,
            file: Mutex::new(file),
            quiet,
        })
    }

    /// Where this push is being logged
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Raw streamed output from a remote command; no newline is added
    pub fn write_chunk(&self, chunk: &str) {
        self.to_file(chunk);
        if !self.quiet {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
    }

    /// A line for the file only (argument echoes, audit breadcrumbs)
    pub fn record(&self, line: &str) {
        self.to_file(line);
        self.to_file("\n");
    }

    /// Plain informational line, suppressed when quiet
    pub fn info(&self, line: &str) {
        self.emit(line, None, false, !self.quiet);
    }

    /// Highlighted progress line, suppressed when quiet
    pub fn notice(&self, line: &str) {
        self.emit(line, Some(Color::Blue), true, !self.quiet);
    }

    /// Warning; always shown
    pub fn warning(&self, line: &str) {
        self.emit(line, Some(Color::Yellow), true, true);
    }

    /// Error; always shown
    pub fn critical(&self, line: &str) {
        self.emit(line, Some(Color::Red), true, true);
    }

    fn emit(&self, line: &str, color: Option<Color>, bold: bool, to_stdout: bool) {
        self.to_file(line);
        self.to_file("\n");

        if to_stdout {
            println!("{}", paint(line, color, bold));
        }
    }

    fn to_file(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(text.as_bytes());
            let _ = file.flush();
        }
    }
}

fn paint(text: &str, color: Option<Color>, bold: bool) -> String {
    let Some(color) = color else {
        return text.to_string();
    };
    let styled = text.with(color);
    if bold {
        styled.bold().to_string()
    } else {
        styled.to_string()
    }
}
