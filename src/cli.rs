//! CLI argument parsing with clap derive

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags};
use crate::application::services::graph::{Executor, ResourceGraph};
use crate::application::services::host::WaitSettings;
use crate::domain::Manifest;
use crate::infra::aws::AwsContext;
use crate::infra::knife::KnifeRunner;
use crate::output::TerminalReporter;

const DEFAULT_REGION: &str = "us-east-1";

/// Declarative EC2 fleet provisioning
#[derive(Parser)]
#[command(
    name = "convoy",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Manifest file declaring the fleet
    #[arg(short, long, global = true, default_value = "convoy.yaml")]
    pub manifest: PathBuf,

    /// Credential profile to operate under
    #[arg(long, global = true, env = "CONVOY_PROFILE", default_value = "staging")]
    pub profile: String,

    /// Provider region (overrides the manifest)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Seconds to wait for a launched instance to report ready
    #[arg(long, global = true, value_name = "SECS", default_value_t = 600)]
    pub readiness_timeout: u64,

    /// Assume yes for confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Output in JSON format (list only)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create every declared resource
    Up,

    /// Destroy every declared resource
    Down,

    /// Run a single target, e.g. security:web:create or host:app:spinup
    Run {
        /// Namespaced target name
        target: String,
    },

    /// List registered targets
    List,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be loaded, the target is
    /// unknown, credentials are unusable, or any operation fails.
    pub async fn run(self) -> Result<()> {
        let ctx = AppContext::new(&AppFlags {
            no_color: self.no_color,
            quiet: self.quiet,
            yes: self.yes,
        });

        let manifest = Manifest::load(&self.manifest)?;
        let mut graph = ResourceGraph::new();
        for spec in &manifest.security {
            graph.security(spec.clone());
        }
        for spec in &manifest.hosts {
            graph.host(spec.clone());
        }

        let raw_target = match &self.command {
            Command::List => {
                let targets = graph.targets();
                if self.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&targets).context("encoding target list")?
                    );
                } else {
                    ctx.output.header("registered targets");
                    for target in targets {
                        println!("  {target}");
                    }
                }
                return Ok(());
            }
            Command::Up => "up".to_string(),
            Command::Down => "down".to_string(),
            Command::Run { target } => target.clone(),
        };

        // Resolve before touching the provider so an unknown target fails
        // without a credential round-trip.
        let plan = graph.resolve(&raw_target)?;

        if matches!(self.command, Command::Down)
            && !ctx.confirm("Destroy every declared resource?", true)?
        {
            ctx.output.info("aborted");
            return Ok(());
        }

        let region = self
            .region
            .clone()
            .or_else(|| manifest.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let aws = AwsContext::connect(&self.profile, &region).await?;
        let cloud = aws.ec2();
        let knife = KnifeRunner::default_runner();
        let reporter = TerminalReporter::new(&ctx.output);

        let executor = Executor {
            cloud: &cloud,
            provisioner: &knife,
            reporter: &reporter,
            defaults: &manifest.defaults,
            wait: WaitSettings {
                timeout: Duration::from_secs(self.readiness_timeout),
                ..WaitSettings::default()
            },
        };
        executor.execute(&graph, &plan).await
    }
}
