//! DevPKI - Development Certificate Authority and OCSP Checker
//!
//! Command line front end for the `devpki` library.
//!
//! ```bash
//! devpki ca init                          # root CA with id "0"
//! devpki ca init issuing --with-parent 0  # subordinate CA
//! devpki ca delete issuing
//! devpki ca delete --all
//! devpki ca list
//! devpki ocsp --uri http://127.0.0.1:8080 ca.cer:leaf1.cer,leaf2.cer
//! ```
//!
//! The process exits 0 on success, otherwise with the code of the
//! [`DevPkiError`] kind that stopped it.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use devpki::ca::{CaIssuer, CertificateAuthority};
use devpki::configs::AppConfig;
use devpki::data_directory::DataDirectory;
use devpki::error::DevPkiError;
use devpki::ocsp_request::{load_certificate, split_list, OcspRequestBuilder};
use devpki::ocsp_transport::HttpTransport;
use devpki::ocsp_validator::{OcspExchange, OcspValidator};
use devpki::storage::Storage;

const DEFAULT_CA_ID: &str = "0";

#[derive(Parser, Debug)]
#[command(name = "devpki")]
#[command(version, about = "Development certificate authority and OCSP checker")]
struct Cli {
    /// Directory holding the CA databases
    #[arg(long, env = "DEVPKI_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to config.toml in the data directory)
    #[arg(short, long, env = "DEVPKI_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage certificate authorities
    #[command(subcommand)]
    Ca(CaCommand),
    /// Query an OCSP responder and validate its answer
    Ocsp(OcspArgs),
}

#[derive(Subcommand, Debug)]
enum CaCommand {
    /// Create a root CA, or a subordinate CA with --with-parent
    Init {
        #[arg(default_value = DEFAULT_CA_ID)]
        id: String,
        /// Subject common name
        #[arg(long)]
        name: Option<String>,
        /// Id of the CA that signs the new certificate
        #[arg(long, visible_alias = "parent-ca")]
        with_parent: Option<String>,
    },
    /// Delete a CA, or every CA with --all
    Delete {
        #[arg(default_value = DEFAULT_CA_ID)]
        id: String,
        #[arg(long)]
        all: bool,
    },
    /// List known CA ids
    List,
}

#[derive(Args, Debug)]
struct OcspArgs {
    /// Responder URI
    #[arg(long)]
    uri: String,
    /// Extra trusted certificates, comma separated
    #[arg(long)]
    chain_certs: Option<String>,
    /// Seconds to wait for the responder
    #[arg(long)]
    timeout: Option<u64>,
    /// issuer.cer:subject1.cer[,subject2.cer...]
    #[arg(required = true, value_name = "PAIR")]
    pairs: Vec<String>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the configuration, then pick the data directory path
///
/// Nothing is created here; only commands that use the record store create
/// the directory.
fn load_config(cli: &Cli) -> Result<(PathBuf, AppConfig)> {
    let search_dir = DataDirectory::locate(cli.data_dir.as_deref(), None)?;
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load_from_dir(&search_dir)?,
    };
    let data_dir = DataDirectory::locate(
        cli.data_dir.as_deref(),
        config.storage.data_directory.as_deref(),
    )?;
    debug!(path = %data_dir.display(), "using data directory");
    Ok((data_dir, config))
}

fn run_ca(command: CaCommand, issuer: &CaIssuer) -> Result<()> {
    match command {
        CaCommand::Init {
            id,
            name,
            with_parent,
        } => {
            let mut authority = CertificateAuthority::new(id);
            if let Some(name) = name {
                authority = authority.with_name(name);
            }
            if let Some(parent) = with_parent {
                authority = authority.with_parent(parent);
            }
            let (_, certificate) = issuer.init(&authority)?;
            let pem = certificate
                .to_pem()
                .map_err(DevPkiError::from)
                .context("Failed to encode certificate")?;
            print!("{}", String::from_utf8_lossy(&pem));
        }
        CaCommand::Delete { id, all } => {
            if all {
                let removed = issuer.delete_all()?;
                println!("Deleted {} CA(s)", removed);
            } else {
                issuer.delete(&id)?;
                println!("Deleted CA {}", id);
            }
        }
        CaCommand::List => {
            for id in issuer.list()? {
                println!("{}", id);
            }
        }
    }
    Ok(())
}

fn run_ocsp(args: OcspArgs, config: &AppConfig) -> Result<()> {
    let chain_certs = match args.chain_certs.as_deref() {
        None => Vec::new(),
        Some(list) => split_list(list)
            .ok_or_else(|| DevPkiError::InvalidOption("--chain-certs contains an empty entry".into()))?
            .iter()
            .map(|path| {
                load_certificate(path).map_err(|e| match e {
                    DevPkiError::InvalidPairing(detail) => DevPkiError::InvalidOption(detail),
                    other => other,
                })
            })
            .collect::<devpki::error::Result<Vec<_>>>()?,
    };

    let timeout = match args.timeout {
        Some(0) => {
            return Err(DevPkiError::InvalidOption("--timeout must be positive".into()).into())
        }
        Some(secs) => Duration::from_secs(secs),
        None => config.ocsp.timeout(),
    };

    let query = OcspRequestBuilder::from_args(&args.pairs)?.build()?;
    let transport = HttpTransport::new(config.ocsp.max_response_bytes)?;
    let validator = OcspValidator::new(chain_certs).with_clock_skew(config.ocsp.clock_skew_secs);

    let validated = OcspExchange::new(&query).execute(&transport, &args.uri, timeout, &validator)?;
    for status in validated.statuses {
        match status.next_update {
            Some(next) => println!(
                "{}: good (this update: {}, next update: {})",
                status.serial, status.this_update, next
            ),
            None => println!("{}: good (this update: {})", status.serial, status.this_update),
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let (data_dir, config) = load_config(&cli)?;
    match cli.command {
        Command::Ca(command) => {
            let storage = Storage::new(DataDirectory::at(data_dir)?);
            let issuer = CaIssuer::new(storage, config.ca.clone());
            run_ca(command, &issuer)
        }
        Command::Ocsp(args) => run_ocsp(args, &config),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            process::exit(DevPkiError::InvalidOption(String::new()).status_code());
        }
    };
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<DevPkiError>()
            .map(DevPkiError::status_code)
            .unwrap_or(1);
        process::exit(code);
    }
}
