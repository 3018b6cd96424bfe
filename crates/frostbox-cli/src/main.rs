//! frostbox: encrypted personal backups in cold object storage
//!
//! Commands:
//!   init   - create (or re-create) the encrypted vault
//!   put    - encrypt and upload a file
//!   get    - download and decrypt an object by storage id
//!   list   - list archive contents
//!   head   - check one object's restore status (scriptable exit code)

mod commands;
mod progress;
mod prompt;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use frostbox_core::FbResult;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "frostbox",
    version,
    about = "Encrypted personal backups in cold object storage",
    long_about = "frostbox encrypts files locally and stores them in an archive-class \
                  S3 bucket. All secrets live in a single password-protected vault file."
)]
struct Cli {
    /// Path to the encrypted vault file
    #[arg(long, short = 'v', env = "FROSTBOX_VAULT", default_value = "~/.frostbox")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the encrypted vault
    Init {
        /// Replace an existing vault (the old one is kept as a .bak copy)
        #[arg(long)]
        reinit: bool,
    },

    /// Encrypt a file and upload it to the archive
    Put {
        /// Local file to archive
        file: PathBuf,
    },

    /// Download an object by storage id and decrypt it
    Get {
        /// Storage id (the encrypted object key, as shown by `list`)
        key: String,
        /// Destination directory (default: current directory)
        dir: Option<PathBuf>,
        /// File name to write (default: the decrypted original name)
        #[arg(long, short = 'o')]
        output: Option<String>,
    },

    /// List archive contents with restore status
    List,

    /// Show one object's metadata; exits 0 when it is ready to download
    Head {
        /// Storage id
        key: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    // Ctrl-C must not leave secrets in resident memory.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            frostbox_secure::wipe_all();
            std::process::exit(130);
        }
    });

    let vault_path = expand_tilde(&cli.vault);
    let code = match run(cli.command, &vault_path).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("frostbox: {err}");
            eprintln!("All in-memory secrets have been wiped; rerun the command after fixing the cause.");
            1
        }
    };

    frostbox_secure::wipe_all();
    std::process::exit(code);
}

async fn run(command: Commands, vault_path: &Path) -> FbResult<i32> {
    match command {
        Commands::Init { reinit } => commands::cmd_init(vault_path, reinit).await.map(|_| 0),
        Commands::Put { file } => commands::cmd_put(vault_path, &file).await.map(|_| 0),
        Commands::Get { key, dir, output } => {
            commands::cmd_get(vault_path, &key, dir.as_deref(), output.as_deref())
                .await
                .map(|_| 0)
        }
        Commands::List => commands::cmd_list(vault_path).await.map(|_| 0),
        Commands::Head { key } => commands::cmd_head(vault_path, &key).await,
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("FROSTBOX_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{home}/{rest}"))
    } else if s == "~" {
        PathBuf::from(std::env::var("HOME").unwrap_or_default())
    } else {
        path.to_path_buf()
    }
}
