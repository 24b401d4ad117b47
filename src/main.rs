use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use trust::{OverrideBits, OverrideFile, OverrideStore, SystemClock};

mod cert_input;
mod common;
mod config;

/// Inspect and edit remembered certificate overrides.
#[derive(Parser)]
#[command(name = "certwarden", version)]
struct Cli {
    /// Directory holding config.toml and cert_override.txt
    #[arg(long, env = "CERTWARDEN_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every permanent override.
    List,
    /// Accept a certificate for HOST:PORT despite the given errors.
    Add {
        host: String,
        #[arg(allow_negative_numbers = true)]
        port: i32,
        /// Fingerprint, or path to a PEM/DER certificate
        cert: String,
        /// Comma separated: untrusted, mismatch, time
        #[arg(long, default_value = "untrusted")]
        bits: OverrideBits,
    },
    /// Forget the override for HOST:PORT.
    Remove {
        host: String,
        #[arg(allow_negative_numbers = true)]
        port: i32,
    },
    /// Report whether an override applies to a certificate on HOST:PORT.
    Check {
        host: String,
        #[arg(allow_negative_numbers = true)]
        port: i32,
        cert: String,
    },
}

async fn load_config(data_dir: &Path) -> anyhow::Result<config::Config> {
    if !data_dir.exists() {
        async_fs::create_dir_all(data_dir)
            .await
            .context("Failed to create certwarden data dir")?;
    }

    let path = data_dir.join(common::CONFIG_FILE);
    if !path.exists() {
        async_fs::write(&path, toml::to_string(&*config::DEFAULT_CONFIG)?)
            .await
            .context("Failed writing default config")?;
    }

    let text = async_fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed reading config from {:?}", path))?;
    toml::from_str(&text).with_context(|| format!("Failed parsing config at {:?}", path))
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| common::DEFAULT_DATA_DIR.clone());
    let config = load_config(&data_dir).await?;
    let store = OverrideStore::new(config.overrides.fingerprint_policy, Rc::new(SystemClock));
    let path = data_dir.join(common::OVERRIDES_FILE);
    let mut file =
        OverrideFile::open(&path, store).with_context(|| format!("opening overrides at {:?}", path))?;

    match cli.command {
        Command::List => {
            let mut entries: Vec<_> = file.store().permanent_entries().collect();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            for entry in entries {
                println!(
                    "{}\t{}\t{}\tscore {}",
                    entry.key, entry.bits, entry.fingerprint, entry.score
                );
            }
        }
        Command::Add {
            host,
            port,
            cert,
            bits,
        } => {
            let host = cert_input::ascii_host(&host)?;
            let fingerprint = cert_input::read_fingerprint(&cert).await?;
            if bits.is_empty() {
                anyhow::bail!("an override needs at least one reason");
            }
            file.remember(&host, port, &fingerprint, bits, false)
                .context("saving override")?;
            info!("{}:{} now accepts {}", host, port, fingerprint);
        }
        Command::Remove { host, port } => {
            let host = cert_input::ascii_host(&host)?;
            if file.clear(&host, port).context("saving overrides")?.is_none() {
                println!("No override for {}:{}", host, port);
            }
        }
        Command::Check { host, port, cert } => {
            let host = cert_input::ascii_host(&host)?;
            let fingerprint = cert_input::read_fingerprint(&cert).await?;
            match file.matching_override(&host, port, &fingerprint) {
                Some(m) => {
                    let lifetime = if m.temporary { "temporary" } else { "permanent" };
                    let cert_state = if m.fingerprint_matches {
                        "certificate matches"
                    } else {
                        "DIFFERENT certificate"
                    };
                    println!("{} ({}), {}", m.bits, lifetime, cert_state);
                    file.save().context("saving access statistics")?;
                    return Ok(m.fingerprint_matches);
                }
                None => {
                    println!("No override for {}:{}", host, port);
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    if !futures::executor::block_on(run(cli))? {
        std::process::exit(1);
    }
    Ok(())
}
