//! Deploy targets and the per-run request

use std::collections::HashMap;

use serde::Deserialize;

/// Fixed deployment topology from configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Host where synchronize / ref resolution / static builds happen and
    /// which receives each repo before the fleet does
    pub build_host: String,
    /// Remote binary driven on every target host
    pub deploy_binary: String,
    /// Remote binary driven on the build host
    pub build_binary: String,
    /// Ref deployed when the operator names none
    #[serde(default = "default_ref")]
    pub default_ref: String,
    /// Repo whose deployment always implies a static build
    #[serde(default = "default_static_repo")]
    pub static_repo: String,
}

fn default_ref() -> String {
    "origin/master".to_string()
}

fn default_static_repo() -> String {
    "public".to_string()
}

/// What the operator asked this push to do
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    /// Repos to fetch on every target host
    pub fetches: Vec<String>,
    /// Repos to deploy on every target host
    pub deploys: Vec<String>,
    /// Requested refs per repo; filled in with concrete revisions by the
    /// resolve-refs phase and immutable afterwards
    pub revisions: HashMap<String, String>,
    /// Extra commands run on each host after fetch/deploy, in order
    pub deploy_commands: Vec<Vec<String>>,
    /// Whether a static build may be performed at all
    pub build_static: bool,
}
