//! Propo command-line client
//!
//! Drives the session layer end to end against a running backend:
//! - Email/password sign-in and registration through the identity toolkit
//! - Profile completion for identities without a backend profile
//! - Inspecting the reconciled session, role and navigation menu
//!
//! Sessions are held in memory, so every command signs in within its own run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use propo_common::{ProfileUpdate, Role};
use propo_config::{AppConfig, ConfigLoader};
use propo_session::{
    nav_items, ApiClient, MemoryNavigator, Navigator, RegistrationFlow, RegistrationForm,
    RegistrationMode, SessionReconciler, SessionSnapshot, SignInFlow, ToolkitIdentity,
    TracingNotifier,
};
use tracing::info;

/// Propo session client
#[derive(Parser, Debug)]
#[command(name = "propo")]
#[command(version, about = "Propo session client")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PROPO_CONFIG")]
    config: Option<PathBuf>,

    /// Account email
    #[arg(long, env = "PROPO_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "PROPO_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and report where the session lands
    Login,

    /// Create an identity and its Propo profile
    Register {
        /// Display name
        #[arg(long, default_value = "")]
        name: String,

        /// ADMIN, OWNER or TENANT
        #[arg(long)]
        role: Role,
    },

    /// Create the Propo profile for an existing identity
    CompleteProfile {
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long)]
        role: Role,
    },

    /// Show the signed-in profile and its menu
    Whoami,

    /// Change the profile display name
    UpdateProfile {
        #[arg(long)]
        name: String,
    },

    /// Sign in, then end the session
    Logout,

    /// Print an example configuration file
    ExampleConfig,
}

struct App {
    reconciler: Arc<SessionReconciler>,
    navigator: Arc<MemoryNavigator>,
}

impl App {
    fn build(config: &AppConfig, start_path: &str) -> Result<Self> {
        let identity = ToolkitIdentity::new(config.identity.clone())
            .context("Failed to create identity client")?;
        let api = ApiClient::new(config.api.clone()).context("Failed to create API client")?;
        let navigator = Arc::new(MemoryNavigator::new(start_path));

        let reconciler = SessionReconciler::new(
            Arc::new(identity),
            api,
            navigator.clone(),
            Arc::new(TracingNotifier),
        );
        reconciler.start();

        Ok(Self {
            reconciler,
            navigator,
        })
    }

    async fn sign_in(&self, cli: &Cli) -> Result<SessionSnapshot> {
        let (email, password) = credentials(cli)?;
        let snapshot = SignInFlow::new(self.reconciler.clone())
            .with_password(email, password)
            .await?;
        Ok(snapshot)
    }
}

fn credentials(cli: &Cli) -> Result<(&str, &str)> {
    let email = cli
        .email
        .as_deref()
        .context("--email (or PROPO_EMAIL) is required")?;
    let password = cli
        .password
        .as_deref()
        .context("--password (or PROPO_PASSWORD) is required")?;
    Ok((email, password))
}

fn print_session(snapshot: &SessionSnapshot, navigator: &MemoryNavigator) {
    println!("state:    {:?}", snapshot.kind());
    println!("access:   {:?}", snapshot.gate());
    if let Some(identity) = &snapshot.identity {
        println!("identity: {}", identity.uid);
    }
    if let Some(profile) = snapshot.profile() {
        println!("profile:  #{} {} <{}>", profile.id, profile.display_name(), profile.email);
        println!("role:     {}", profile.role);
    }
    println!("location: {}", navigator.current_path());

    let path = navigator.current_path();
    let role = snapshot.profile().map(|p| p.role);
    for item in nav_items(role) {
        let marker = if item.is_active(&path) { '*' } else { ' ' };
        println!("  {} {:<12} {}", marker, item.label, item.path);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::ExampleConfig = cli.command {
        print!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("Failed to load configuration")?;

    propo_common::logging::init_logging_with(
        "propo-cli",
        &config.logging.format,
        &config.logging.filter,
    );
    info!(api = %config.api.base_url, "Starting Propo client");

    let start_path = match cli.command {
        Commands::Register { .. } => "/register",
        Commands::CompleteProfile { .. } => "/register?mode=complete_profile",
        _ => "/login",
    };
    let app = App::build(&config, start_path)?;

    match &cli.command {
        Commands::Login | Commands::Whoami => {
            let snapshot = app.sign_in(&cli).await?;
            print_session(&snapshot, &app.navigator);
        }
        Commands::Register { name, role } | Commands::CompleteProfile { name, role } => {
            let flow = RegistrationFlow::new(app.reconciler.clone());
            match RegistrationMode::from_path(&app.navigator.current_path()) {
                RegistrationMode::Fresh => {
                    let (email, password) = credentials(&cli)?;
                    let form = RegistrationForm {
                        email: email.to_string(),
                        name: name.clone(),
                        role: *role,
                    };
                    flow.register(&form, password).await?;
                }
                RegistrationMode::CompleteProfile => {
                    let snapshot = app.sign_in(&cli).await?;
                    if snapshot.profile().is_some() {
                        info!("Account already has a profile");
                    } else {
                        flow.complete_profile(name, *role).await?;
                    }
                }
            }
            print_session(&app.reconciler.snapshot(), &app.navigator);
        }
        Commands::UpdateProfile { name } => {
            app.sign_in(&cli).await?;
            let update = ProfileUpdate {
                name: Some(name.clone()),
                documents: None,
            };
            app.reconciler
                .api()
                .update_profile(&update)
                .await
                .context("Failed to update profile")?;
            app.reconciler.refresh_profile().await?;
            print_session(&app.reconciler.snapshot(), &app.navigator);
        }
        Commands::Logout => {
            app.sign_in(&cli).await?;
            app.reconciler.sign_out().await?;
            print_session(&app.reconciler.snapshot(), &app.navigator);
        }
        Commands::ExampleConfig => {}
    }

    app.reconciler.stop();
    Ok(())
}
