//! depot-cli - Command-line interface for the depot storage tool
//!
//! This crate provides the main CLI application for depot, including:
//! - Storing local files on a cloud provider, chunked for large files
//! - Retrieving remote files into the local tmp directory
//! - Remote folder management
//! - JSON settings management

use anyhow::Result;
use clap::{Parser, Subcommand};
use depot_core::{Settings, Storage};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// depot - Provider-backed remote file storage
///
/// Depot stores local files on a cloud object store behind a small
/// path-level interface, with resumable chunked uploads for large files.
#[derive(Parser)]
#[command(name = "depot")]
#[command(author, version, about = "Provider-backed remote file storage", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file on the backend
    Store {
        /// Local file to store
        file: PathBuf,

        /// Remote folder to store it under, relative to the root
        #[arg(short, long)]
        folder: Option<String>,
    },

    /// Remove a file from the backend
    Remove {
        /// Remote file path, relative to the root
        path: String,
    },

    /// Create a folder on the backend
    Mkdir {
        /// Remote folder path, relative to the root
        path: String,
    },

    /// Remove a folder and everything in it from the backend
    Rmdir {
        /// Remote folder path, relative to the root
        path: String,
    },

    /// Download a file from the backend into the local tmp directory
    Retrieve {
        /// Remote file path, relative to the root
        path: String,

        /// Copy the downloaded file to this location
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Empty the local tmp directory
    Clean,

    /// Delete everything under the remote root
    Wipe {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show or create the settings file
    Config {
        /// Show current settings
        #[arg(long, conflicts_with_all = ["init", "path"])]
        show: bool,

        /// Write a settings template to the settings location
        #[arg(long, conflicts_with_all = ["show", "path"])]
        init: bool,

        /// Show the settings file path
        #[arg(long, conflicts_with_all = ["show", "init"])]
        path: bool,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            error!("Error: {}", e);

            let exit_code = map_error_to_exit_code(&e);
            process::exit(exit_code);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Store { file, folder } => {
            let storage = open_storage(cli.settings.as_deref())?;
            info!("Storing {}", file.display());

            let stored = storage.store_file(&file, folder.as_deref())?;

            info!("Stored {} ({} bytes)", stored.name, stored.size);
            println!("{}", stored.remote_path);
        }

        Commands::Remove { path } => {
            let storage = open_storage(cli.settings.as_deref())?;
            storage.remove_file(&path)?;
            info!("Removed {}", path);
        }

        Commands::Mkdir { path } => {
            let storage = open_storage(cli.settings.as_deref())?;
            let created = storage.create_folder(&path)?;
            info!("Created folder {}", created.remote_path);
            println!("{}", created.remote_path);
        }

        Commands::Rmdir { path } => {
            let storage = open_storage(cli.settings.as_deref())?;
            storage.remove_folder(&path)?;
            info!("Removed folder {}", path);
        }

        Commands::Retrieve { path, output } => {
            let storage = open_storage(cli.settings.as_deref())?;
            info!("Retrieving {}", path);

            let local = storage.retrieve_file(&path)?;
            let delivered = match output {
                Some(out) => {
                    std::fs::copy(&local, &out)?;
                    out
                }
                None => local,
            };

            println!("{}", delivered.display());
        }

        Commands::Clean => {
            let storage = open_storage(cli.settings.as_deref())?;
            storage.clean()?;
            info!(
                "Cleaned tmp directory {}",
                storage.settings().tmp.display()
            );
        }

        Commands::Wipe { yes } => {
            if !yes {
                error!("Refusing to wipe without confirmation");
                return Err(anyhow::anyhow!(
                    "wipe deletes everything under the remote root; pass --yes to confirm"
                ));
            }

            let storage = open_storage(cli.settings.as_deref())?;
            storage.wipe()?;
            info!("Wiped remote root");
        }

        Commands::Config { show, init, path } => {
            handle_config(cli.settings.as_deref(), show, init, path)?;
        }
    }

    Ok(())
}

fn resolve_settings_path(override_path: Option<&Path>) -> Result<PathBuf> {
    match override_path {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(Settings::settings_path()?),
    }
}

fn open_storage(override_path: Option<&Path>) -> Result<Storage> {
    let settings_path = resolve_settings_path(override_path)?;

    if !settings_path.exists() {
        error!("No settings file at {}", settings_path.display());
        return Err(anyhow::anyhow!(
            "no settings file at {}; run `depot config --init` to create a template",
            settings_path.display()
        ));
    }

    let settings = Settings::load(&settings_path)?;
    Ok(depot_cloud::open(settings)?)
}

fn handle_config(
    override_path: Option<&Path>,
    show: bool,
    init: bool,
    path: bool,
) -> Result<()> {
    let settings_path = resolve_settings_path(override_path)?;

    if show {
        let settings = Settings::load(&settings_path)?;
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else if init {
        if settings_path.exists() {
            error!("Settings file already exists: {}", settings_path.display());
            return Err(anyhow::anyhow!(
                "settings file already exists: {}",
                settings_path.display()
            ));
        }

        if let Some(parent) = settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&settings_path, Settings::example_content())?;

        info!("Wrote settings template to {}", settings_path.display());
        println!("{}", settings_path.display());
    } else if path {
        println!("{}", settings_path.display());
    } else {
        eprintln!("Please specify --show, --init, or --path");
    }

    Ok(())
}

/// Map errors to exit codes:
/// - 0: Success
/// - 1: General error
/// - 2: IO error
/// - 3: Invalid path or arguments
/// - 4: Remote transfer failure
fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<depot_core::Error>() {
        match core_err {
            depot_core::Error::Io(_) => 2,
            depot_core::Error::InvalidPath(_) => 3,
            depot_core::Error::IsADirectory(_) => 3,
            depot_core::Error::Settings(_) => 1,
            depot_core::Error::Remote(_) => 4,
            depot_core::Error::AttemptsExhausted { .. } => 4,
        }
    } else if err.is::<std::io::Error>() {
        2
    } else {
        1
    }
}
