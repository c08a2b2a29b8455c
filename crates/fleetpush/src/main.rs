//! fleetpush: rolling deployments from a single control node
//!
//! Resolves the operator's host references against the inventory, then walks
//! the fleet one host at a time over reused SSH sessions, pausing for
//! operator input and recovering from per-host failures along the way.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleetpush_core::{
    HostPlan, OrderDirectives, PushControl, PushEngine, PushError, PushRequest, order_hosts,
};
use fleetpush_exec::{DryRunRunner, OutputMirror, RemoteRunner, SshRunner};
use fleetpush_inventory::{HostSource, make_host_source, sorted_naturally};

mod args;
mod config;
mod listeners;
mod oplog;
mod pushid;

use args::Args;
use config::Config;
use listeners::prompt::PromptDecider;
use oplog::OpLog;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(error) = color_eyre::install() {
        eprintln!("fleetpush: {error}");
    }

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("fleetpush: {error:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> eyre::Result<ExitCode> {
    let args = Args::parse();
    let config = Config::load_default(args.config.as_deref())?;
    init_tracing(args.quiet);

    let push_id = pushid::generate(&config.paths.wordlist);
    let oplog = Arc::new(OpLog::open(&config.paths.log_root, &push_id, args.quiet)?);

    let mut source = make_host_source(&config.hosts).await?;

    // resolution happens before any remote action; if it fails, nothing has
    // been touched, but the inventory still gets its shutdown
    let plan = match build_plan(&args, &config, source.as_ref(), &push_id).await {
        Ok(plan) => plan,
        Err(error) => {
            source.shut_down().await;
            return Err(error.into());
        }
    };

    let mirror: OutputMirror = {
        let log = oplog.clone();
        Arc::new(move |chunk: &str| log.write_chunk(chunk))
    };

    let runner: Box<dyn RemoteRunner> = if args.testing {
        Box::new(DryRunRunner::new(config.ssh.sudo).with_mirror(mirror))
    } else {
        match SshRunner::new(config.ssh.to_exec_config()) {
            Ok(runner) => Box::new(runner.with_mirror(mirror)),
            Err(error) => {
                source.shut_down().await;
                return Err(error.into());
            }
        }
    };

    let request = PushRequest {
        fetches: args.fetches.clone(),
        deploys: args.deploys.clone(),
        revisions: args.revision_map(),
        deploy_commands: args.deploy_commands(),
        build_static: !args.no_static,
    };

    let mut engine = PushEngine::new(config.deploy.clone(), request, plan, runner, source);

    let interactive = !args.quiet && !args.auto_continue && std::io::stdin().is_terminal();
    let auto = Arc::new(AtomicBool::new(!interactive));

    if interactive {
        engine = engine.with_decider(Box::new(PromptDecider::new(oplog.clone())));
    }

    let hosts = engine.hosts().to_vec();
    let sleeptime = args.sleeptime.unwrap_or(config.defaults.sleeptime);

    listeners::console::register(engine.events_mut(), oplog.clone(), hosts.clone(), args.testing);
    listeners::prompt::register_gate(
        engine.events_mut(),
        oplog.clone(),
        engine.control(),
        hosts.clone(),
        sleeptime,
        auto,
    );
    if let Some(url) = &config.notify.webhook_url {
        if !args.no_notify && !args.testing {
            let summary = summarize(&args, hosts.len());
            listeners::notify::register(
                engine.events_mut(),
                url.clone(),
                push_id.clone(),
                summary,
            );
        }
    }

    audit_invocation(&oplog, &push_id);
    install_signal_handlers(engine.control());

    match engine.run().await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        // cancelled, not crashed; the console listener already said so
        Err(PushError::Cancelled { .. }) => Ok(ExitCode::from(2)),
        Err(error) => {
            oplog.critical(&format!("Push failed: {error}"));
            Ok(ExitCode::from(1))
        }
    }
}

/// Inventory enumeration, alias resolution, ordering, and bounding
async fn build_plan(
    args: &Args,
    config: &Config,
    source: &dyn HostSource,
    push_id: &str,
) -> Result<HostPlan, PushError> {
    let all_hosts = sorted_naturally(source.get_all_hosts().await?);
    let resolved = fleetpush_core::resolve(&args.host_refs, &all_hosts, &config.aliases)?;

    let directives = OrderDirectives {
        shuffle: args.shuffle || config.defaults.shuffle,
        seed: args.seed.clone(),
        start_at: args.start_at.clone(),
        stop_before: args.stop_before.clone(),
    };
    order_hosts(resolved, directives, push_id)
}

fn summarize(args: &Args, host_count: usize) -> String {
    let mut actions = Vec::new();
    if !args.fetches.is_empty() {
        actions.push(format!("fetch {}", args.fetches.join(", ")));
    }
    if !args.deploys.is_empty() {
        actions.push(format!("deploy {}", args.deploys.join(", ")));
    }
    for command in args.deploy_commands() {
        actions.push(command.join(" "));
    }
    let what = if actions.is_empty() {
        "nothing".to_string()
    } else {
        actions.join("; ")
    };

    let user = std::env::var("USER").unwrap_or_else(|_| "someone".to_string());
    format!("{user} is pushing to {host_count} hosts: {what}")
}

/// File-only breadcrumb tying the log to the exact invocation
fn audit_invocation(oplog: &OpLog, push_id: &str) {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let time = chrono::Utc::now().format("%Y-%m-%d %H:%M");
    let argv: Vec<String> = std::env::args().skip(1).collect();
    oplog.record(&format!(
        "Push {push_id} started by {user} at {time} UTC with args: {}",
        argv.join(" ")
    ));
}

fn install_signal_handlers(control: PushControl) {
    let on_interrupt = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel("received SIGINT");
        }
    });

    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut hangup) = signal(SignalKind::hangup()) {
            if hangup.recv().await.is_some() {
                control.cancel("received SIGHUP. tsk tsk.");
            }
        }
    });
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "error" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
