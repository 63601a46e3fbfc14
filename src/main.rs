use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use offload_rs::offload::chunk::memory::DEFAULT_MAX_PAYLOAD;
use offload_rs::offload::chunk::{ChunkStoreClient, HttpChunkClient, MemoryChunkStore};
use offload_rs::offload::lmo::LocalObjectStore;
use offload_rs::offload::{server, MessageRefScanner};
use offload_rs::sdk::OffloadConfig;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an in-memory chunk host
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 7420)]
        port: u16,

        /// Largest payload accepted, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
        max_payload: u64,
    },
    /// Offload the oversized fields of a JSON message
    Offload {
        /// Path to the offload configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Message to read (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the result (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve the references in a message back to their values
    Resolve {
        /// Path to the offload configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Message to read (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the result (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show a local record without its data
    Inspect {
        #[arg(short, long)]
        config: PathBuf,

        /// Record id
        id: String,
    },
    /// Delete a local record
    Delete {
        #[arg(short, long)]
        config: PathBuf,

        /// Record id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    match args.command {
        Commands::Serve { port, max_payload } => {
            // The subscriber also forwards `log` records from the library
            tracing_subscriber::fmt()
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;

            server::serve(port, MemoryChunkStore::with_max_payload(max_payload))
                .await
                .map_err(|e| anyhow::anyhow!("chunk host stopped: {}", e))?;
        }
        Commands::Offload {
            config,
            input,
            output,
        } => {
            env_logger::init();
            let scanner = build_scanner(&config)?;
            let message = read_input(input.as_deref())?;
            let offloaded = scanner
                .offload(&message)
                .await
                .context("failed to offload message")?;
            write_output(output.as_deref(), &offloaded)?;
        }
        Commands::Resolve {
            config,
            input,
            output,
        } => {
            env_logger::init();
            let scanner = build_scanner(&config)?;
            let message = read_input(input.as_deref())?;
            let resolved = scanner
                .resolve(&message)
                .await
                .context("failed to resolve message")?;
            write_output(output.as_deref(), &resolved)?;
        }
        Commands::Inspect { config, id } => {
            env_logger::init();
            let objects = local_objects(&config)?;
            let mut record = objects
                .deserialize(&id)
                .await
                .with_context(|| format!("failed to read record {}", id))?;
            record.data = None;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Delete { config, id } => {
            env_logger::init();
            let objects = local_objects(&config)?;
            objects
                .delete(&id)
                .await
                .with_context(|| format!("failed to delete record {}", id))?;
            println!("Deleted {}", id);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<OffloadConfig> {
    let config = OffloadConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?
        .with_env_overrides();
    config.validate().context("invalid offload configuration")?;
    Ok(config)
}

fn build_scanner(path: &Path) -> anyhow::Result<MessageRefScanner> {
    let config = load_config(path)?;

    let remote_client: Option<Arc<dyn ChunkStoreClient>> = match &config.remote.endpoint {
        Some(endpoint) if config.remote.enabled => {
            let client = HttpChunkClient::new(endpoint)?;
            Some(Arc::new(client))
        }
        _ => None,
    };

    match MessageRefScanner::from_config(&config, remote_client)? {
        Some(scanner) => {
            log::info!("Using {} store", scanner.store().name());
            Ok(scanner)
        }
        None => bail!("no store enabled in {}", path.display()),
    }
}

fn local_objects(path: &Path) -> anyhow::Result<LocalObjectStore> {
    let config = load_config(path)?;
    Ok(LocalObjectStore::from_config(&config.local)?)
}

fn read_input(input: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match input {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn write_output(output: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
    }
}
