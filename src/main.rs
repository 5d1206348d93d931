use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mixeddns::{Authenticator, CredentialStore};

#[derive(Parser)]
#[command(name = "mixeddns")]
#[command(about = "ACME DNS-01 authenticator for domains spread across multiple DNS providers")]
#[command(version)]
struct Cli {
    /// Credentials file with provider and per-zone sections
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the TXT validation record for a dns-01 challenge
    ///
    /// Usable as a certbot --manual-auth-hook: arguments fall back to the
    /// CERTBOT_DOMAIN and CERTBOT_VALIDATION environment variables.
    Perform {
        /// Domain under challenge
        domain: Option<String>,

        /// Validation record name (defaults to _acme-challenge.<domain>)
        validation_name: Option<String>,

        /// Validation record value
        validation: Option<String>,

        /// Seconds to wait for DNS propagation after creating the records
        #[arg(long, default_value_t = 10)]
        propagation_seconds: u64,
    },

    /// No-op: validation records are never removed (known limitation)
    Cleanup {
        domain: Option<String>,
    },

    /// Show which providers would serve a domain's challenge
    Resolve {
        domain: String,
    },

    /// Show the credentials file location and an example
    Config,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn credentials_path(cli: &Cli) -> PathBuf {
    cli.credentials
        .clone()
        .unwrap_or_else(CredentialStore::default_path)
}

fn arg_or_env(value: Option<String>, var: &str, what: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => bail!("{} not given and {} is not set", what, var),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let path = credentials_path(&cli);

    match cli.command {
        Commands::Perform {
            domain,
            validation_name,
            validation,
            propagation_seconds,
        } => {
            let domain = arg_or_env(domain, "CERTBOT_DOMAIN", "domain")?;
            let validation = arg_or_env(validation, "CERTBOT_VALIDATION", "validation value")?;
            let validation_name =
                validation_name.unwrap_or_else(|| format!("_acme-challenge.{}", domain));

            let mut authenticator = Authenticator::from_file(&path)
                .with_context(|| format!("failed to load credentials from {}", path.display()))?;

            authenticator
                .perform(&domain, &validation_name, &validation)
                .await?;

            if propagation_seconds > 0 {
                info!("waiting {}s for DNS propagation", propagation_seconds);
                tokio::time::sleep(Duration::from_secs(propagation_seconds)).await;
            }
        }

        Commands::Cleanup { domain } => {
            let domain = domain
                .or_else(|| std::env::var("CERTBOT_DOMAIN").ok())
                .unwrap_or_default();
            println!(
                "cleanup is a no-op: validation records are not removed{}",
                if domain.is_empty() {
                    String::new()
                } else {
                    format!(" (domain: {})", domain)
                }
            );
        }

        Commands::Resolve { domain } => {
            let mut authenticator = Authenticator::from_file(&path)
                .with_context(|| format!("failed to load credentials from {}", path.display()))?;

            let providers = authenticator.resolve_providers(&domain).await?;
            for provider in providers {
                println!("{}", provider);
            }
        }

        Commands::Config => {
            show_config(&path);
        }
    }

    Ok(())
}

fn show_config(path: &std::path::Path) {
    println!("Credentials file location: {}\n", path.display());

    match CredentialStore::load(path) {
        Ok(store) => {
            println!("Configured sections:\n");
            for section in store.sections() {
                println!("  [{}]", section);
            }
        }
        Err(_) => {
            println!("Credentials file not found.");
            println!("\nCreate a credentials file at the location above.");
            println!("Example:\n");
            println!(
                r#"[cloudflare]
api_token = "your-cloudflare-api-token"

[route53]
access_key_id = "AKIA..."
secret_access_key = "..."

# Route a zone to a provider explicitly, skipping NS detection:
["example.com"]
provider = "cloudflare"

# Map a vanity nameserver to one or more providers:
["ns1.example-dns.org."]
provider = "cloudflare, route53"
"#
            );
        }
    }
}
