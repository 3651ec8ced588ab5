//! edgebulk - Command-line tool for bulk device lifecycle operations
//!
//! Drives the batched command API: login with MFA, bulk tagging, profile and
//! definition changes, settings pushes, deletion, onboarding and paginated
//! queries.

mod commands;
mod config;
mod devices;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use edge_client::{ClientConfig, DeleteSelector, EdgeClient};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, MergedConfig};
use crate::devices::DeviceArgs;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "edgebulk")]
#[command(author, version, about = "Bulk device lifecycle operations")]
#[command(propagate_version = true)]
struct Cli {
    /// Batched command endpoint URL
    #[arg(short, long, env = "EDGE_ENDPOINT")]
    endpoint: Option<String>,

    /// Session token from a previous login
    #[arg(short, long, env = "EDGE_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the session token
    Login {
        /// Account name
        #[arg(short, long)]
        username: String,

        /// Account password
        #[arg(long, env = "EDGE_PASSWORD", hide_env_values = true)]
        password: String,

        /// One-time code for an MFA challenge
        #[arg(long)]
        mfa_code: Option<String>,
    },

    /// Check whether the session is still valid
    Verify,

    /// End the session
    Logout,

    /// Switch the session to another organization
    SwitchOrg {
        /// Organization ID
        org_id: String,
    },

    /// Add or remove tags
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Change the device profile
    Profile {
        /// Profile ID
        #[arg(long, conflicts_with = "profile_name", required_unless_present = "profile_name")]
        profile_id: Option<String>,

        /// Profile name (resolved to an ID)
        #[arg(long)]
        profile_name: Option<String>,

        #[command(flatten)]
        devices: DeviceArgs,
    },

    /// Push a settings value to each device
    Settings {
        /// Device identifier (repeat, paired in order with --value)
        #[arg(long = "device", required = true)]
        devices: Vec<String>,

        /// Settings value (repeat, one per --device)
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// Change the thing definition
    ChangeDef {
        /// Thing definition key
        #[arg(long, conflicts_with = "def_name", required_unless_present = "def_name")]
        def_key: Option<String>,

        /// Thing definition name (resolved to a key)
        #[arg(long)]
        def_name: Option<String>,

        #[command(flatten)]
        devices: DeviceArgs,
    },

    /// Clear the data destination of devices
    Undeploy {
        #[command(flatten)]
        devices: DeviceArgs,
    },

    /// Delete things (exactly one selector)
    Delete {
        /// Thing keys
        #[arg(long, num_args = 1..)]
        keys: Vec<String>,

        /// Thing IDs
        #[arg(long, num_args = 1..)]
        ids: Vec<String>,

        /// Tags
        #[arg(long, num_args = 1..)]
        tags: Vec<String>,

        /// Free-form query
        #[arg(long)]
        query: Option<String>,
    },

    /// Onboard devices from inventory
    Onboard {
        /// Device profile ID
        #[arg(long)]
        profile_id: String,

        /// Thing definition ID
        #[arg(long)]
        def_id: String,

        /// Tag for the new things (repeatable)
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,

        #[command(flatten)]
        devices: DeviceArgs,
    },

    /// Run a paginated query and print every record
    Query {
        /// Command name (e.g., thing.list)
        command: String,

        /// Command parameters as JSON object
        #[arg(long)]
        params: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Verify => "verify",
            Self::Logout => "logout",
            Self::SwitchOrg { .. } => "switch-org",
            Self::Tags { .. } => "tags",
            Self::Profile { .. } => "profile",
            Self::Settings { .. } => "settings",
            Self::ChangeDef { .. } => "change-def",
            Self::Undeploy { .. } => "undeploy",
            Self::Delete { .. } => "delete",
            Self::Onboard { .. } => "onboard",
            Self::Query { .. } => "query",
        }
    }
}

#[derive(Subcommand)]
enum TagAction {
    /// Add tags to devices
    Add {
        /// Tag (repeatable)
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,

        #[command(flatten)]
        devices: DeviceArgs,
    },

    /// Remove tags from devices
    Delete {
        /// Tag (repeatable)
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,

        #[command(flatten)]
        devices: DeviceArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.endpoint.as_deref(),
        cli.session.as_deref(),
        cli.no_color,
    );

    // Create output context
    let ctx = OutputContext::new(cli.output, merged.no_color, cli.quiet);
    let client = create_client(&merged)?;
    debug!(
        endpoint = %merged.endpoint,
        session_restored = merged.session.is_some(),
        command = cli.command.name(),
        "Dispatching command"
    );

    // Execute command
    match &cli.command {
        Commands::Login {
            username,
            password,
            mfa_code,
        } => {
            commands::login(&client, username, password, mfa_code.as_deref(), &ctx).await?;
        }

        Commands::Verify => {
            commands::verify(&client, &ctx).await?;
        }

        Commands::Logout => {
            require_session(&client)?;
            commands::logout(&client, &ctx).await?;
        }

        Commands::SwitchOrg { org_id } => {
            require_session(&client)?;
            commands::switch_org(&client, org_id, &ctx).await?;
        }

        Commands::Tags { action } => {
            require_session(&client)?;
            let (add, tags, devices) = match action {
                TagAction::Add { tags, devices } => (true, tags, devices),
                TagAction::Delete { tags, devices } => (false, tags, devices),
            };
            commands::tags(&client, add, tags, &devices.resolve()?, &ctx).await?;
        }

        Commands::Profile {
            profile_id,
            profile_name,
            devices,
        } => {
            require_session(&client)?;
            commands::profile(
                &client,
                profile_id.as_deref(),
                profile_name.as_deref(),
                &devices.resolve()?,
                &ctx,
            )
            .await?;
        }

        Commands::Settings { devices, values } => {
            require_session(&client)?;
            commands::settings(&client, devices, values, &ctx).await?;
        }

        Commands::ChangeDef {
            def_key,
            def_name,
            devices,
        } => {
            require_session(&client)?;
            commands::change_def(
                &client,
                def_key.as_deref(),
                def_name.as_deref(),
                &devices.resolve()?,
                &ctx,
            )
            .await?;
        }

        Commands::Undeploy { devices } => {
            require_session(&client)?;
            commands::undeploy(&client, &devices.resolve()?, &ctx).await?;
        }

        Commands::Delete {
            keys,
            ids,
            tags,
            query,
        } => {
            let selector =
                DeleteSelector::from_criteria(keys.clone(), ids.clone(), tags.clone(), query.clone())?;
            require_session(&client)?;
            commands::delete(&client, selector, &ctx).await?;
        }

        Commands::Onboard {
            profile_id,
            def_id,
            tags,
            devices,
        } => {
            require_session(&client)?;
            commands::onboard(
                &client,
                devices.resolve()?,
                profile_id,
                def_id,
                tags.clone(),
                &ctx,
            )
            .await?;
        }

        Commands::Query { command, params } => {
            require_session(&client)?;
            commands::query(&client, command, params.as_deref(), &ctx).await?;
        }
    }

    Ok(())
}

/// Create a client for the merged configuration, restoring any known session
fn create_client(merged: &MergedConfig) -> Result<EdgeClient> {
    let mut client_config = match &merged.client_config {
        Some(path) => ClientConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load client config: {}", path.display()))?,
        None => ClientConfig::default(),
    };
    client_config.connection.endpoint_url = merged.endpoint.clone();

    let client = EdgeClient::with_config(client_config).context("Failed to create edge client")?;
    if let Some(session) = &merged.session {
        debug!("Restoring saved session");
        client.restore_session(session.clone());
    }
    Ok(client)
}

fn require_session(client: &EdgeClient) -> Result<()> {
    if !client.is_session_valid() {
        bail!("No session: run `edgebulk login` or set EDGE_SESSION");
    }
    Ok(())
}
