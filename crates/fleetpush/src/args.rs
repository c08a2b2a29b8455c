//! Command-line surface
//!
//! `-h` takes host references, as two decades of muscle memory expect from
//! this tool's lineage; `--help` still prints help.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "fleetpush",
    about = "Deploy code to a fleet of hosts, one host at a time",
    disable_help_flag = true,
    after_help = "To deploy all code: fleetpush -h apps -p public private -d public private -r all"
)]
pub struct Args {
    /// Hosts, aliases, or globs to execute commands on
    #[arg(
        short = 'h',
        long = "hosts",
        value_name = "HOST",
        num_args = 1..,
        required = true
    )]
    pub host_refs: Vec<String>,

    /// Print help
    #[arg(long = "help", action = ArgAction::HelpLong)]
    help: Option<bool>,

    /// Fetch the specified repo(s) on each host
    #[arg(short = 'p', long = "fetch", value_name = "REPO", num_args = 1..)]
    pub fetches: Vec<String>,

    /// Deploy the specified repo(s) on each host
    #[arg(short = 'd', long = "deploy", value_name = "REPO", num_args = 1..)]
    pub deploys: Vec<String>,

    /// Revision to deploy for the specified repo
    #[arg(
        long = "rev",
        value_names = ["REPO", "REF"],
        num_args = 2,
        action = ArgAction::Append
    )]
    pub revisions: Vec<String>,

    /// Extra deploy command to run on each host
    #[arg(
        short = 'c',
        long = "cmd",
        value_name = "COMMAND",
        num_args = 1..,
        action = ArgAction::Append
    )]
    pub commands: Vec<Vec<String>>,

    /// Whom to (gracefully) restart on each host
    #[arg(short = 'r', long = "restart", value_name = "TARGET", action = ArgAction::Append)]
    pub restarts: Vec<String>,

    /// Whom to kill on each host
    #[arg(
        short = 'k',
        long = "kill",
        value_name = "TARGET",
        value_parser = ["all", "apps"],
        action = ArgAction::Append
    )]
    pub kills: Vec<String>,

    /// Shuffle the host list
    #[arg(long)]
    pub shuffle: bool,

    /// Seed word for the shuffle; defaults to the push id
    #[arg(long, value_name = "WORD")]
    pub seed: Option<String>,

    /// Skip to this position in the host list
    #[arg(long = "startat", value_name = "HOST")]
    pub start_at: Option<String>,

    /// Stop the push just before this host
    #[arg(long = "stopbefore", value_name = "HOST")]
    pub stop_before: Option<String>,

    /// Seconds to sleep between hosts when continuing automatically
    #[arg(long, value_name = "SECONDS")]
    pub sleeptime: Option<u64>,

    /// Testing: print commands but don't execute them
    #[arg(short = 't', long = "test")]
    pub testing: bool,

    /// Quiet: no output except errors; implies --no-input
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Don't build static files
    #[arg(long = "no-static")]
    pub no_static: bool,

    /// Don't wait for input between hosts
    #[arg(long = "no-input")]
    pub auto_continue: bool,

    /// Don't announce the push to the webhook
    #[arg(long = "no-notify")]
    pub no_notify: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Requested refs per repo from repeated `--rev REPO REF`
    #[must_use]
    pub fn revision_map(&self) -> HashMap<String, String> {
        self.revisions
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// The ordered deploy command list from `-c`, `-r`, and `-k`
    #[must_use]
    pub fn deploy_commands(&self) -> Vec<Vec<String>> {
        let mut commands = self.commands.clone();
        for target in &self.restarts {
            commands.push(vec!["restart".to_string(), target.clone()]);
        }
        for target in &self.kills {
            commands.push(vec!["kill".to_string(), target.clone()]);
        }
        commands
    }
}
