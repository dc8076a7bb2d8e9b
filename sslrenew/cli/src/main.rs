use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fs_err as fs;
use sslrenew::{generate_csr, ApiClient, CertificateId, HttpTransport, OutputDir, Renewer};
use tracing::{info, warn};

use config::{load_config, Config};

mod config;

#[derive(Subcommand)]
enum Command {
    /// Create or reuse a certificate, then renew and activate it when it is close to expiration
    Renew {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Certificate to renew instead of creating a new one
        #[arg(long)]
        certificate_id: Option<String>,
        /// Renew even if the certificate is outside the renewal window
        #[arg(long)]
        force: bool,
    },
    /// Show the expiration of a certificate and whether it can be renewed
    Info {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Certificate to inspect
        #[arg(long)]
        certificate_id: String,
    },
    /// Generate a CSR and private key without calling the API
    Csr {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Directory to write csr.pem and key.pem to
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Generate configuration template
    Cfg {
        /// Write to file
        #[arg(short, long)]
        write_to: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_log: bool,
    #[command(subcommand)]
    command: Command,
}

fn load_checked(config: Option<&str>) -> Result<Config> {
    let config = load_config(config)?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn api_client(config: &Config) -> Result<ApiClient<HttpTransport>> {
    let transport =
        HttpTransport::new(config.request_timeout()).context("failed to create transport")?;
    Ok(ApiClient::new(config.api_config(), transport))
}

async fn renew(config: Option<&str>, certificate_id: Option<String>, force: bool) -> Result<()> {
    let config = load_checked(config)?;
    let renewer = Renewer::new(
        api_client(&config)?,
        config.renewer_config(certificate_id, force),
    );
    let outcome = renewer.run().await;
    if outcome.is_halted() {
        bail!("{outcome}");
    }
    info!("{outcome}");
    Ok(())
}

async fn info(config: Option<&str>, certificate_id: &str) -> Result<()> {
    let config = load_checked(config)?;
    let certificate_id =
        CertificateId::parse(certificate_id).context("certificate id must not be empty or zero")?;
    let renewer = Renewer::new(api_client(&config)?, config.renewer_config(None, false));
    let eligibility = renewer.check_eligibility(&certificate_id).await;
    let Some(days) = eligibility.days_until_expiration else {
        bail!("failed to determine the expiration of certificate {certificate_id}");
    };
    println!(
        "certificate {certificate_id} expires in {days} days, eligible for renewal: {}",
        eligibility.eligible
    );
    Ok(())
}

fn csr(config: Option<&str>, out: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let csr = generate_csr(&config.subject, config.key_bits)?;
    match out.or(config.output_dir) {
        Some(dir) => {
            let dir = OutputDir::new(dir).store_standalone(&csr)?;
            info!("wrote csr.pem and key.pem to {}", dir.display());
        }
        None => {
            warn!("no output directory given, the private key is discarded");
            print!("{}", csr.csr_pem);
        }
    }
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_log);

    match args.command {
        Command::Renew {
            config,
            certificate_id,
            force,
        } => {
            renew(config.as_deref(), certificate_id, force).await?;
        }
        Command::Info {
            config,
            certificate_id,
        } => {
            info(config.as_deref(), &certificate_id).await?;
        }
        Command::Csr { config, out } => {
            csr(config.as_deref(), out)?;
        }
        Command::Cfg { write_to } => {
            let toml_str = Config::template()?.to_commented_toml()?;
            match write_to {
                Some(path) => fs::write(path, toml_str)?,
                None => println!("{}", toml_str),
            }
        }
    }
    Ok(())
}
