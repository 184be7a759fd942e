//! multiprofile - Run isolated browser instances side by side
//!
//! Command-line front end over the profile registry and instance supervisor.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use single_instance::SingleInstance;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use multiprofile::core::{
    matcher_for, InstanceSupervisor, LaunchTarget, Profile, ProfileRegistry,
    Settings,
};
use multiprofile::persistence::ProfileStore;
use multiprofile::platform::Platform;
use multiprofile::{APP_NAME, APP_VERSION};

#[derive(Parser)]
#[command(name = "multiprofile", version, about = "Run isolated browser instances side by side")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List profiles and whether their instance is running
    List,
    /// Register a new profile directory
    Add { name: String, dir: String },
    /// Forget a profile (its directory is left on disk)
    Remove { name: String },
    /// Launch the instance for a profile
    Start {
        name: String,
        /// Stay attached until the instance exits
        #[arg(long)]
        wait: bool,
    },
    /// Ask the instance for a profile to terminate
    Stop { name: String },
}

impl Commands {
    fn mutates(&self) -> bool {
        !matches!(self, Self::List)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let platform = Platform::current();
    let (settings, settings_error) = match Settings::try_load(&platform.settings_file()) {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    // Initialize logging
    init_logging(&settings);
    if let Some(e) = settings_error {
        warn!("Using default settings: {}", e);
    }

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Only one supervisor may rewrite the registry at a time
    let _guard = if cli.command.mutates() {
        Some(acquire_supervisor_lock()?)
    } else {
        None
    };

    let registry = ProfileRegistry::new(
        ProfileStore::new(settings.registry_file(&platform)),
        platform.clone(),
    );
    let profiles = registry.load();

    match cli.command {
        Commands::List => {
            let supervisor = build_supervisor(&platform, &settings, &profiles);
            print_instances(&supervisor);
        }
        Commands::Add { name, dir } => {
            registry
                .add(&name, &dir, &profiles)
                .with_context(|| format!("Failed to add profile '{}'", name))?;
            println!("Added profile '{}'", name);
        }
        Commands::Remove { name } => {
            registry
                .remove(&name, &profiles)
                .with_context(|| format!("Failed to remove profile '{}'", name))?;
            println!("Removed profile '{}'", name);
        }
        Commands::Start { name, wait } => {
            let supervisor = build_supervisor(&platform, &settings, &profiles);
            let waiter = supervisor
                .start(&name)
                .with_context(|| format!("Failed to start '{}'", name))?;
            println!("Started '{}'", name);

            if wait {
                match waiter.await.context("Wait task failed")? {
                    Some(outcome) => println!("'{}' exited: {}", name, outcome.describe()),
                    None => println!("'{}' is no longer supervised", name),
                }
            }
        }
        Commands::Stop { name } => {
            let supervisor = build_supervisor(&platform, &settings, &profiles);
            supervisor
                .stop(&name)
                .with_context(|| format!("Failed to stop '{}'", name))?;
            println!("Stop requested for '{}'", name);
        }
    }

    Ok(())
}

/// Initialize the logging system
fn init_logging(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn acquire_supervisor_lock() -> Result<SingleInstance> {
    let instance = SingleInstance::new(APP_NAME)
        .map_err(|e| anyhow::anyhow!("Failed to create single instance lock: {}", e))?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        anyhow::bail!("another {} is managing the profile registry", APP_NAME);
    }
    Ok(instance)
}

fn build_supervisor(
    platform: &Platform,
    settings: &Settings,
    profiles: &[Profile],
) -> InstanceSupervisor {
    let target = LaunchTarget::from_settings(platform.family, settings);
    let matcher = matcher_for(platform, &target);
    let mut supervisor = InstanceSupervisor::new(platform.clone(), target, matcher);
    supervisor.materialize(profiles);
    supervisor
}

fn print_instances(supervisor: &InstanceSupervisor) {
    // A fresh process never owns a handle, so there is no PID or uptime to show
    println!("{:<24} {:<20}  DIRECTORY", "NAME", "STATUS");
    for row in supervisor.snapshot() {
        println!("{:<24} {:<20}  {}", row.name, row.status.label(), row.directory);
    }
}
