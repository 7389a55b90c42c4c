mod artifact;
mod commands;
mod output;
mod spec_file;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stratus_cloud::{Env, RetryPolicy};
use stratus_cloud_memory::MemoryCloud;
use stratus_config::{RetryTuning, Settings};
use stratus_core::{Mode, ResourceKind};
use tracing_subscriber::EnvFilter;

/// Converge cloud resources toward declared specs.
#[derive(Parser)]
#[command(name = "stratus", version, about)]
struct Cli {
    /// Compute and report changes without applying them
    #[arg(long, global = true)]
    preview: bool,

    /// Path to the control-plane state file
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Converge one resource toward a spec file
    Ensure {
        /// JSON spec file (kind, name, attributes)
        spec: PathBuf,
    },

    /// Delete a resource; already-absent is success
    Rm { kind: ResourceKind, name: String },

    /// Converge a role's permission grants
    Grants {
        role: String,

        /// Inline allow statement, "<action> <resource>" (repeatable)
        #[arg(long = "allow", value_name = "ACTION RESOURCE")]
        allows: Vec<String>,

        /// Managed policy name to attach (repeatable)
        #[arg(long = "policy", value_name = "NAME")]
        policies: Vec<String>,

        /// Encryption key whose policy should allow the role
        #[arg(long)]
        key: Option<String>,
    },

    /// Converge one trigger binding from a binding file
    Trigger {
        /// JSON binding file (source, target, attrs)
        binding: PathBuf,
    },

    /// Converge a whole deploy plan
    Deploy {
        /// JSON plan file (resources, grants, triggers)
        plan: PathBuf,
    },

    /// Unwind a deploy plan: triggers, grants, then resources
    Down { plan: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let state_path = cli.state.clone().unwrap_or_else(|| settings.state_path.clone());
    let env = Env::new(settings.region.clone(), settings.account.clone());
    let policy = retry_policy(&settings.retry);
    let mode = if cli.preview { Mode::Preview } else { Mode::Apply };

    let cloud = MemoryCloud::load(&state_path, env.clone()).await?;

    let report = match &cli.command {
        Command::Ensure { spec } => commands::ensure::run(&cloud, &policy, spec, mode).await?,
        Command::Rm { kind, name } => {
            commands::rm::run(&cloud, &policy, *kind, name, mode).await?
        }
        Command::Grants {
            role,
            allows,
            policies,
            key,
        } => {
            commands::grants::run(&cloud, &env, &policy, role, allows, policies, key.clone(), mode)
                .await?
        }
        Command::Trigger { binding } => {
            commands::trigger::run(&cloud, &env, &policy, binding, mode).await?
        }
        Command::Deploy { plan } => {
            commands::deploy::run(&cloud, &env, &policy, plan, mode).await?
        }
        Command::Down { plan } => commands::deploy::down(&cloud, &policy, plan, mode).await?,
    };

    output::print_report(&report, mode);

    if !mode.is_preview() {
        cloud.save(&state_path).await?;
    }
    Ok(())
}

fn retry_policy(tuning: &RetryTuning) -> RetryPolicy {
    RetryPolicy {
        base_delay: std::time::Duration::from_millis(tuning.base_delay_ms),
        multiplier: tuning.multiplier,
        max_delay: std::time::Duration::from_millis(tuning.max_delay_ms),
        budget: std::time::Duration::from_millis(tuning.budget_ms),
    }
}
