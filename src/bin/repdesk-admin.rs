use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repdesk::config::Config;
use repdesk::models::ADMIN_ROLE;
use repdesk::storage;

#[derive(Parser)]
#[command(name = "repdesk-admin")]
#[command(about = "Manage dashboard access for Repdesk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant the admin role to an identity-service user
    Grant {
        /// User ID (the `sub` claim issued by the identity service)
        user_id: String,
        /// Email shown in `list` output
        #[arg(long)]
        email: Option<String>,
    },
    /// Remove a user's dashboard role
    Revoke {
        user_id: String,
    },
    /// List users holding a dashboard role
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage = storage::open(&config.database).await?;

    match cli.command {
        Commands::Grant { user_id, email } => {
            if user_id.trim().is_empty() {
                bail!("user id must not be empty");
            }
            storage
                .grant_role(user_id.trim(), email.as_deref(), ADMIN_ROLE)
                .await?;
            println!("✓ Granted '{ADMIN_ROLE}' to user '{}'", user_id.trim());
        }
        Commands::Revoke { user_id } => {
            if storage.revoke_role(&user_id).await? {
                println!("✓ Revoked dashboard access for user '{user_id}'");
            } else {
                println!("⚠ User '{user_id}' had no dashboard role");
            }
        }
        Commands::List => {
            let roles = storage.list_roles().await?;
            if roles.is_empty() {
                println!("No users hold a dashboard role");
            } else {
                println!("{:<40} {:<32} {:<8} GRANTED AT", "USER ID", "EMAIL", "ROLE");
                for role in roles {
                    let granted = chrono::DateTime::from_timestamp(role.granted_at, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                        .unwrap_or_else(|| role.granted_at.to_string());
                    println!(
                        "{:<40} {:<32} {:<8} {}",
                        role.user_id,
                        role.email.as_deref().unwrap_or("-"),
                        role.role,
                        granted
                    );
                }
            }
        }
    }

    Ok(())
}
