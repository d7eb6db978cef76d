//! Tottori CLI - Command-line client for the dashboard session
//!
//! Signs in against the dashboard's Auth Service and keeps the session in a
//! token file, so later invocations pick it up again.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rpassword::prompt_password;
use std::path::{Path, PathBuf};
use tottori_core::{
    default_config_path, init_logging, performance, LoggingConfig, TottoriConfig, TottoriError,
};
use tottori_session::{
    AuthOutcome, Credentials, PasswordChange, ProfileUpdate, Registration, SessionManager,
    UserProfile,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "tottori")]
#[command(about = "Session client for the Tottori regional statistics dashboard")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        /// Username or email address
        user: String,

        /// Password; prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,

        /// Ask the service for a long-lived session
        #[arg(long)]
        remember_me: bool,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user, as reported by the service
    Whoami,

    /// Show the local session state without contacting the service
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Renew the access token
    Refresh,

    /// Create an account
    Register {
        username: String,
        email: String,

        /// Password; prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,

        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        organization: Option<String>,
    },

    /// Show or update the profile of the signed-in user
    Profile {
        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        organization: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        timezone: Option<String>,

        #[arg(long)]
        theme: Option<String>,
    },

    /// Change the password; ends the session
    ChangePassword,

    /// Ask for a password reset email
    RequestReset { email: String },

    /// Set a new password with a reset token
    ResetPassword {
        token: String,

        /// New password; prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Confirm an email address
    VerifyEmail { token: String },

    /// List server-side sessions of the signed-in user
    Sessions,

    /// End one of the signed-in user's sessions
    TerminateSession { id: i64 },

    /// Configuration management
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Show the effective configuration
        #[arg(long)]
        show: bool,

        /// Validate the configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Tottori CLI v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Commands::Config {
        init,
        show,
        validate,
    } = cli.command
    {
        return handle_config(&config_path, init, show, validate);
    }

    let config = TottoriConfig::load_or_default(&config_path)
        .and_then(|config| config.validate().map(|()| config))
        .map_err(|e| {
            explain(&e);
            e
        })
        .with_context(|| format!("Unusable configuration at {}", config_path.display()))?;

    let manager = SessionManager::from_config(&config)?;
    manager.initialize().await;

    performance::measure_async("cli_command", run(cli.command, &manager)).await
}

async fn run(command: Commands, manager: &SessionManager) -> Result<()> {
    match command {
        Commands::Login {
            user,
            password,
            remember_me,
        } => {
            let password = password_or_prompt(password, "Password: ")?;
            let credentials = Credentials::new(user, password).remember_me(remember_me);
            report(manager.login(&credentials).await)?;

            if let Some(user) = manager.current_user_cached() {
                print_user(&user);
            }
        }
        Commands::Logout => {
            manager.logout().await;
            println!("Signed out");
        }
        Commands::Whoami => match manager.current_user().await? {
            Some(user) => print_user(&user),
            None => bail!("Not signed in"),
        },
        Commands::Status { json } => {
            let snapshot = manager.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("Phase:          {}", snapshot.phase);
                match &snapshot.current_user {
                    Some(user) => println!("User:           {} ({})", user.display_name(), user.role),
                    None => println!("User:           -"),
                }
                println!("Admin:          {}", snapshot.access.is_admin);
                println!("Analyst:        {}", snapshot.access.is_analyst);
                println!("Policy maker:   {}", snapshot.access.is_policy_maker);
                println!("Refresh token:  {}", snapshot.has_refresh_token);
                if let Some(expires_at) = snapshot.access_expires_at {
                    println!("Token expires:  {}", expires_at.to_rfc3339());
                }
            }
        }
        Commands::Refresh => {
            manager.refresh_access_token().await?;
            println!("Access token renewed");
        }
        Commands::Register {
            username,
            email,
            password,
            full_name,
            department,
            organization,
        } => {
            let password = password_or_prompt(password, "Password: ")?;
            let registration = Registration {
                username,
                email,
                password,
                full_name,
                department,
                organization,
            };
            report(manager.register(&registration).await)?;
        }
        Commands::Profile {
            full_name,
            department,
            organization,
            language,
            timezone,
            theme,
        } => {
            let update = ProfileUpdate {
                full_name,
                department,
                organization,
                language,
                timezone,
                theme,
                ..Default::default()
            };

            if update.is_empty() {
                match manager.current_user().await? {
                    Some(user) => print_profile(&user)?,
                    None => bail!("Not signed in"),
                }
            } else {
                report(manager.update_profile(&update).await?)?;
                if let Some(user) = manager.current_user_cached() {
                    print_profile(&user)?;
                }
            }
        }
        Commands::ChangePassword => {
            let current = read_secret("Current password: ")?;
            let new = read_secret("New password: ")?;
            report(
                manager
                    .change_password(&PasswordChange::new(current, new))
                    .await?,
            )?;
            println!("Signed out; sign in again with the new password");
        }
        Commands::RequestReset { email } => {
            report(manager.request_password_reset(&email).await)?;
        }
        Commands::ResetPassword { token, password } => {
            let password = password_or_prompt(password, "New password: ")?;
            report(manager.reset_password(&token, &password).await)?;
        }
        Commands::VerifyEmail { token } => {
            report(manager.verify_email(&token).await)?;
        }
        Commands::Sessions => {
            let sessions = manager.list_sessions().await?;
            if sessions.is_empty() {
                println!("No active sessions");
            }
            for session in sessions {
                println!(
                    "{:>6}  {}{}  {}  last used {}",
                    session.id,
                    session.device_info.as_deref().unwrap_or("unknown device"),
                    if session.is_current { " (this one)" } else { "" },
                    session.ip_address.as_deref().unwrap_or("-"),
                    session.last_accessed.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::TerminateSession { id } => {
            report(manager.terminate_session(id).await?)?;
        }
        // Handled in main before the session is loaded
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn handle_config(path: &Path, init: bool, show: bool, validate: bool) -> Result<()> {
    if init {
        if path.exists() {
            bail!("Configuration already exists at {}", path.display());
        }
        TottoriConfig::default().save_to_file(path)?;
        println!("Configuration initialized at {}", path.display());
    }

    if show {
        let config = TottoriConfig::load_or_default(path)?;
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        let config = TottoriConfig::load_or_default(path)?;
        if let Err(e) = config.validate() {
            explain(&e);
            return Err(e.into());
        }
        println!("Configuration is valid");
    }

    Ok(())
}

/// Log a configuration problem and print its hints
fn explain(error: &TottoriError) {
    error.log();
    for hint in error.suggestions() {
        eprintln!("hint: {}", hint);
    }
}

/// Print the outcome's message, turning a failure into an error
fn report(outcome: AuthOutcome) -> Result<()> {
    match outcome {
        AuthOutcome::Success { message } => {
            if let Some(message) = message {
                println!("{}", message);
            }
            Ok(())
        }
        AuthOutcome::Failure { message } => bail!(message),
    }
}

fn print_user(user: &UserProfile) {
    println!("Signed in as {} ({})", user.display_name(), user.role);
}

fn print_profile(user: &UserProfile) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(user)?);
    Ok(())
}

fn password_or_prompt(password: Option<String>, label: &str) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => read_secret(label),
    }
}

/// Read a password from the terminal without echo
fn read_secret(label: &str) -> Result<String> {
    let secret = prompt_password(label).context("Failed to read password")?;
    debug!("Read {} characters of password input", secret.chars().count());
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from(["tottori", "-v", "login", "a@b.com", "-p", "x"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Login {
                user,
                password,
                remember_me,
            } => {
                assert_eq!(user, "a@b.com");
                assert_eq!(password.as_deref(), Some("x"));
                assert!(!remember_me);
            }
            _ => panic!("expected login"),
        }
    }

    #[test]
    fn test_password_flag_skips_terminal_prompt() {
        let password = password_or_prompt(Some("s3cret".to_string()), "Password: ").unwrap();
        assert_eq!(password, "s3cret");
    }

    #[test]
    fn test_report_failure_is_error() {
        assert!(report(AuthOutcome::success()).is_ok());
        let error = report(AuthOutcome::failure("ログインに失敗しました")).unwrap_err();
        assert_eq!(error.to_string(), "ログインに失敗しました");
    }

    #[test]
    fn test_config_validate_reports_bad_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = TottoriConfig::default();
        config.auth.base_url = "ftp://stats.example.jp".to_string();
        config.save_to_file(&path).unwrap();

        let error = handle_config(&path, false, false, true).unwrap_err();
        assert!(error.to_string().contains("ftp"));
    }

    #[test]
    fn test_config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        handle_config(&path, true, false, true).unwrap();
        assert!(path.exists());
        assert!(handle_config(&path, true, false, false).is_err());
    }
}
