//! Interactive control
//!
//! Raw-mode single-character input for the between-host gate and the
//! error decider. The gate model is boolean: prompt after every host until
//! the operator presses `a`, then continue automatically with a countdown
//! sleep between hosts.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use fleetpush_core::{
    ErrorDecider, ErrorDecision, EventBus, Phase, PushControl, PushError, Stage,
};

use crate::oplog::OpLog;

/// Subscribe the between-host gate.
///
/// `auto` starts true for `--no-input`/`-q`/non-TTY runs, in which case the
/// gate only paces the push with the sleeptime countdown.
pub fn register_gate(
    events: &mut EventBus,
    log: Arc<OpLog>,
    control: PushControl,
    hosts: Vec<String>,
    sleeptime: u64,
    auto: Arc<AtomicBool>,
) {
    events.subscribe(Phase::ProcessHost, Stage::Ended, move |payload| {
        let Some(host) = payload.host else { return };
        if hosts.last().map(String::as_str) == Some(host) {
            return;
        }

        if auto.load(Ordering::SeqCst) {
            countdown(&log, sleeptime);
        } else {
            wait_at_gate(&log, &control, &auto);
        }
    });
}

fn wait_at_gate(log: &OpLog, control: &PushControl, auto: &AtomicBool) {
    log.info(
        "Press \"x\" to abort, \"c\" to continue to the next host, \"s\" to skip the next host, \
         or \"a\" to continue automatically.",
    );

    loop {
        match read_key() {
            Ok('x') => {
                control.cancel("\"x\" pressed");
                return;
            }
            Ok('c') => return,
            Ok('s') => {
                control.skip_next_host();
                return;
            }
            Ok('a') => {
                auto.store(true, Ordering::SeqCst);
                log.info("Continuing automatically. Press ^C to abort.");
                return;
            }
            Ok(_) => {}
            Err(_) => {
                // terminal went away; stop asking
                auto.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

fn countdown(log: &OpLog, sleeptime: u64) {
    if sleeptime == 0 {
        return;
    }

    log.write_chunk("Sleeping...");
    for remaining in (1..=sleeptime).rev() {
        log.write_chunk(&format!(" {remaining}..."));
        std::thread::sleep(Duration::from_secs(1));
    }
    log.write_chunk("\n");
}

/// Read one character without echoing it. `^C` reads as `x` since raw mode
/// swallows the signal.
fn read_key() -> io::Result<char> {
    terminal::enable_raw_mode()?;
    let key = read_key_raw();
    terminal::disable_raw_mode()?;
    key
}

fn read_key_raw() -> io::Result<char> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                return Ok('x');
            }
            if let KeyCode::Char(c) = key.code {
                return Ok(c);
            }
        }
    }
}

/// Error policy that asks the operator what to do
pub struct PromptDecider {
    log: Arc<OpLog>,
}

impl PromptDecider {
    /// Create a decider that prompts through the operator log
    #[must_use]
    pub fn new(log: Arc<OpLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ErrorDecider for PromptDecider {
    async fn decide(&self, host: &str, error: &PushError) -> ErrorDecision {
        self.log
            .critical(&format!("Encountered error on {host}: {error}"));
        self.log.info(
            "Press \"x\" to abort, \"r\" to retry this host, or \"c\" to skip to the next host.",
        );

        loop {
            match read_key() {
                Ok('x') | Err(_) => return ErrorDecision::Abort,
                Ok('r') => return ErrorDecision::Retry,
                Ok('c') => return ErrorDecision::Continue,
                Ok(_) => {}
            }
        }
    }
}
