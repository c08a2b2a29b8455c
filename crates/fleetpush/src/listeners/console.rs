//! The push narrative

use std::sync::Arc;

use fleetpush_core::{EventBus, Phase, PushError, Stage};

use crate::oplog::OpLog;

/// Subscribe the operator-facing progress messages
pub fn register(events: &mut EventBus, log: Arc<OpLog>, hosts: Vec<String>, testing: bool) {
    {
        let log = log.clone();
        events.subscribe(Phase::Push, Stage::Began, move |_| {
            if testing {
                log.warning("*** Testing mode. No commands will be run. ***");
            }
            log.notice("*** Beginning push. ***");
            log.notice(&format!("Log available at {}", log.path().display()));
        });
    }

    let phase_banners = [
        (Phase::Synchronize, "Synchronizing build repos..."),
        (Phase::ResolveRefs, "Resolving refs..."),
        (Phase::DeployToBuildHost, "Deploying to build host..."),
        (Phase::BuildStatic, "Building static files..."),
    ];
    for (phase, banner) in phase_banners {
        let log = log.clone();
        events.subscribe(phase, Stage::Began, move |_| log.notice(banner));
    }

    {
        let log = log.clone();
        events.subscribe(Phase::ProcessHost, Stage::Began, move |payload| {
            if let Some(host) = payload.host {
                log.notice(&format!("Starting host \"{host}\"..."));
            }
        });
    }

    {
        let log = log.clone();
        events.subscribe(Phase::ProcessHost, Stage::Ended, move |payload| {
            let Some(host) = payload.host else { return };
            let total = hosts.len();
            let Some(done) = hosts.iter().position(|h| h == host).map(|i| i + 1) else {
                return;
            };
            let percent = done * 100 / total;
            log.notice(&format!(
                "Host \"{host}\" done ({done} of {total} -- {percent}% done)."
            ));
        });
    }

    {
        let log = log.clone();
        events.subscribe(Phase::Push, Stage::Ended, move |_| {
            log.notice("*** Push complete! ***");
        });
    }

    events.subscribe(Phase::Push, Stage::Aborted, move |payload| {
        if let Some(PushError::Cancelled { reason }) = payload.error {
            log.critical(&format!("*** Push cancelled ({reason}) ***"));
        }
    });
}
