//! SMB2 client CLI

use clap::{Parser, Subcommand};
use smb2_client::client::{ClientConfig, SmbClient};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "smb-client")]
#[command(about = "Pipelining SMB2 client", long_about = None)]
struct Args {
    /// Share to connect to, as \\host\share
    #[arg(short = 's', long)]
    share: String,

    /// Port to connect to
    #[arg(short = 'p', long, default_value = "445")]
    port: u16,

    /// Username for authentication
    #[arg(short = 'u', long, default_value = "guest")]
    username: String,

    /// Password for authentication
    #[arg(short = 'P', long, default_value = "")]
    password: String,

    /// Domain/workgroup
    #[arg(short = 'd', long, default_value = "WORKGROUP")]
    domain: String,

    /// Packets kept in flight per transfer
    #[arg(long, default_value = "20")]
    concurrency: usize,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List files in a directory
    Ls {
        /// Directory path to list
        #[arg(default_value = "")]
        path: String,
        /// Show size and modification time
        #[arg(short, long)]
        long: bool,
    },

    /// Download a file from the server
    Get {
        /// Remote file path
        remote: String,
        /// Local file path (optional, uses remote filename if not specified)
        local: Option<PathBuf>,
    },

    /// Upload a file to the server
    Put {
        /// Local file path
        local: PathBuf,
        /// Remote file path (optional, uses local filename if not specified)
        remote: Option<String>,
    },

    /// Check whether a file exists
    Exists {
        path: String,
    },

    /// Delete a file
    Rm {
        path: String,
    },
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("download")
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ClientConfig {
        port: args.port,
        packet_concurrency: args.concurrency,
        ..ClientConfig::new(args.share.clone())
    }
    .with_credentials(args.username, args.password, args.domain);

    let mut client = SmbClient::new(config)?;
    tracing::info!("Connecting to {}", client.share());
    client.connect().await?;

    let outcome = run(&client, args.command).await;
    if let Err(e) = client.close().await {
        tracing::debug!("Close failed: {}", e);
    }
    outcome
}

async fn run(client: &SmbClient, command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Ls { path, long: false } => {
            for name in client.read_dir(&path).await? {
                println!("{}", name);
            }
        }

        Commands::Ls { path, long: true } => {
            for entry in client.read_dir_verbose(&path).await? {
                let modified = entry
                    .last_write_time
                    .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let kind = if entry.is_directory() { "d" } else { "-" };
                println!("{} {:>12} {} {}", kind, entry.size, modified, entry.name);
            }
        }

        Commands::Get { remote, local } => {
            let local_path = local.unwrap_or_else(|| PathBuf::from(file_name(&remote)));
            tracing::info!("Downloading {} -> {}", remote, local_path.display());
            let data = client.read_file(&remote).await?;
            tokio::fs::write(&local_path, &data).await?;
            println!("{} bytes", data.len());
        }

        Commands::Put { local, remote } => {
            let remote = match remote {
                Some(remote) => remote,
                None => local
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or("local path has no file name")?,
            };
            tracing::info!("Uploading {} -> {}", local.display(), remote);
            let written = client.write_file(&local, &remote).await?;
            println!("{} bytes", written);
        }

        Commands::Exists { path } => {
            let exists = client.file_exists(&path).await?;
            println!("{}", exists);
            if !exists {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Rm { path } => {
            client.unlink_file(&path).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
