//! nasctl
//!
//! Browse and manage local storage and SMB shares from the command line.

mod output;

use std::io::BufRead;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use storage::config::{default_config_path, Config};
use storage::session::{system_connector, SmbConnector, SmbTarget, SmbTransport};
use storage::tree::{search_tree, transfer_tree};
use storage::{
    batch, Backend, BackendKind, ConnectionProfile, FilterOptions, SortField, SortOption,
    StorageBackend, StorageError, StorageHub, StorageResult,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// nasctl - browse and manage local storage and SMB shares.
#[derive(Parser, Debug)]
#[command(name = "nasctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Selects the remote backend through a saved connection.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Target {
    /// Saved connection (name or id) to operate on instead of local storage
    #[arg(long, short, value_name = "CONNECTION")]
    pub remote: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List a directory
    Ls {
        /// Directory to list (defaults to the current directory, or the share
        /// list for remote targets)
        path: Option<String>,

        #[command(flatten)]
        target: Target,

        /// Include hidden entries
        #[arg(long, short)]
        all: bool,

        /// Sort field
        #[arg(long, value_enum, default_value = "name")]
        sort: SortArg,

        /// Sort in descending order
        #[arg(long)]
        desc: bool,
    },

    /// Show one entry
    Stat {
        path: String,

        #[command(flatten)]
        target: Target,
    },

    /// Show the total size of a file or directory
    Du {
        path: String,

        #[command(flatten)]
        target: Target,
    },

    /// Find entries whose name contains a query (case-insensitive)
    Search {
        /// Directory to search from
        root: String,

        /// Substring to look for; empty matches everything
        #[arg(default_value = "")]
        query: String,

        #[command(flatten)]
        target: Target,

        /// Only look at direct children of the root
        #[arg(long)]
        no_recursive: bool,
    },

    /// Create a directory
    Mkdir {
        /// Parent directory
        parent: String,

        /// Name of the new directory
        name: String,

        #[command(flatten)]
        target: Target,
    },

    /// Permanently delete files or directory trees
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,

        #[command(flatten)]
        target: Target,
    },

    /// Copy a file or directory tree
    Cp {
        src: String,
        dst: String,

        #[command(flatten)]
        target: Target,
    },

    /// Move a file or directory tree
    Mv {
        src: String,
        dst: String,

        #[command(flatten)]
        target: Target,
    },

    /// Rename an entry within its directory
    Rename {
        path: String,
        new_name: String,

        #[command(flatten)]
        target: Target,
    },

    /// Copy local files to a remote share
    Upload {
        /// Local source
        src: String,

        /// Remote destination (e.g. /share/dir/name)
        dst: String,

        /// Saved connection (name or id)
        #[arg(long, short)]
        remote: String,
    },

    /// Copy files from a remote share to local storage
    Download {
        /// Remote source (e.g. /share/dir/name)
        src: String,

        /// Local destination
        dst: String,

        /// Saved connection (name or id)
        #[arg(long, short)]
        remote: String,
    },

    /// Manage saved connections
    #[command(subcommand)]
    Connections(ConnectionsCommands),

    /// Scan the local network for SMB servers
    Discover {
        /// Any address in the /24 subnet to scan (defaults to this machine's)
        #[arg(long)]
        subnet: Option<Ipv4Addr>,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for saved connections.
#[derive(Subcommand, Debug, Clone)]
pub enum ConnectionsCommands {
    /// List saved connections
    List,

    /// Save a new connection
    Add {
        /// Display name
        name: String,

        /// Server host name or address
        host: String,

        /// Server port (defaults to the configured SMB port)
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, short)]
        user: Option<String>,

        /// Read the password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,

        #[arg(long, default_value = "")]
        domain: String,

        /// Preferred share
        #[arg(long, default_value = "")]
        share: String,

        #[arg(long, default_value = "")]
        workgroup: String,

        /// Log in as guest
        #[arg(long)]
        anonymous: bool,

        /// Make this the default connection
        #[arg(long)]
        default: bool,
    },

    /// Delete a saved connection
    Remove {
        /// Name or id
        connection: String,
    },

    /// Mark a saved connection as the default
    SetDefault {
        /// Name or id
        connection: String,
    },

    /// Connect once and list the server's shares
    Test {
        /// Name or id
        connection: String,
    },
}

/// Subcommands for configuration.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file if none exists
    Init,
}

/// Sort field for listings.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortArg {
    Name,
    Size,
    Date,
    Type,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortField::Name,
            SortArg::Size => SortField::Size,
            SortArg::Date => SortField::Date,
            SortArg::Type => SortField::Type,
        }
    }
}

/// Used when this build cannot reach real SMB servers.
struct UnavailableConnector;

impl SmbConnector for UnavailableConnector {
    fn connect(&self, _target: &SmbTarget) -> StorageResult<Arc<dyn SmbTransport>> {
        Err(StorageError::ConnectionError(
            "nasctl was built without SMB support; rebuild with --features libsmbclient"
                .to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();
    config.validate()?;

    let _log_guard = init_logging(&config, cli.verbose)?;
    tracing::debug!(config = %config_path.display(), "Configuration loaded");

    let connector = system_connector().unwrap_or_else(|| Arc::new(UnavailableConnector));
    let hub = StorageHub::from_config(config, connector)?;
    let result = run(cli.command, &hub, cli.json, &config_path).await;
    hub.disconnect();
    result
}

/// Install the stderr subscriber and, if configured, a file sink.
fn init_logging(config: &Config, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &config.general.log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory: {}", directory.display())
            })?;
            let file_name = path
                .file_name()
                .context("log_file must name a file")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn run(command: Commands, hub: &StorageHub, json: bool, config_path: &Path) -> Result<()> {
    match command {
        Commands::Ls {
            path,
            target,
            all,
            sort,
            desc,
        } => {
            let backend = open_backend(hub, &target).await?;
            let dir = match path {
                Some(p) => resolve_path(&backend, &p)?,
                None => default_dir(&backend)?,
            };
            let filter = FilterOptions::default().show_hidden(all || hub.config().local.show_hidden);
            let mut entries = filter.apply(backend.list(&dir)?);
            SortOption::new(sort.into(), !desc).sort(&mut entries);

            if json {
                output::print_json(&entries)?;
            } else {
                output::print_entries_table(&entries);
            }
        }

        Commands::Stat { path, target } => {
            let backend = open_backend(hub, &target).await?;
            let path = resolve_path(&backend, &path)?;
            let entry = backend
                .stat(&path)?
                .with_context(|| format!("{path} does not exist"))?;
            if json {
                output::print_json(&entry)?;
            } else {
                output::print_entries_table(std::slice::from_ref(&entry));
            }
        }

        Commands::Du { path, target } => {
            let backend = open_backend(hub, &target).await?;
            let path = resolve_path(&backend, &path)?;
            let bytes = backend.size(&path)?;
            if json {
                output::print_json(&serde_json::json!({ "path": path, "size": bytes }))?;
            } else {
                println!("{}\t{}", output::format_size(bytes), path);
            }
        }

        Commands::Search {
            root,
            query,
            target,
            no_recursive,
        } => {
            let backend = open_backend(hub, &target).await?;
            let root = resolve_path(&backend, &root)?;
            let outcome = search_tree(&backend, &root, &query, !no_recursive)?;
            if json {
                output::print_json(&outcome)?;
            } else {
                output::print_paths(&outcome.entries);
                output::print_skipped(&outcome.skipped);
            }
            if !outcome.is_complete() {
                bail!(
                    "search skipped {} unreadable director{}",
                    outcome.skipped.len(),
                    if outcome.skipped.len() == 1 { "y" } else { "ies" }
                );
            }
        }

        Commands::Mkdir {
            parent,
            name,
            target,
        } => {
            let backend = open_backend(hub, &target).await?;
            let parent = resolve_path(&backend, &parent)?;
            let entry = backend.mkdir(&parent, &name)?;
            if json {
                output::print_json(&entry)?;
            } else {
                println!("Created {}", entry.path);
            }
        }

        Commands::Rm { paths, target } => {
            let backend = open_backend(hub, &target).await?;
            let paths = paths
                .iter()
                .map(|p| resolve_path(&backend, p))
                .collect::<Result<Vec<_>>>()?;
            let outcome = batch::delete_all(&backend, &paths);
            report_batch("delete", &outcome, json)?;
        }

        Commands::Cp { src, dst, target } => {
            let backend = open_backend(hub, &target).await?;
            let src = resolve_path(&backend, &src)?;
            let dst = resolve_path(&backend, &dst)?;
            backend.copy(&src, &dst)?;
            output::print_relocation("Copied", &src, &dst, json)?;
        }

        Commands::Mv { src, dst, target } => {
            let backend = open_backend(hub, &target).await?;
            let src = resolve_path(&backend, &src)?;
            let dst = resolve_path(&backend, &dst)?;
            backend.move_to(&src, &dst)?;
            output::print_relocation("Moved", &src, &dst, json)?;
        }

        Commands::Rename {
            path,
            new_name,
            target,
        } => {
            let backend = open_backend(hub, &target).await?;
            let path = resolve_path(&backend, &path)?;
            let entry = backend.rename(&path, &new_name)?;
            if json {
                output::print_json(&entry)?;
            } else {
                println!("Renamed to {}", entry.path);
            }
        }

        Commands::Upload { src, dst, remote } => {
            let local = hub.backend(BackendKind::Local);
            let remote = connect_remote(hub, &remote).await?;
            let src = resolve_path(&local, &src)?;
            let dst = resolve_path(&remote, &dst)?;
            let report = transfer_tree(&local, &src, &remote, &dst)?;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_transfer(&report);
            }
        }

        Commands::Download { src, dst, remote } => {
            let local = hub.backend(BackendKind::Local);
            let remote = connect_remote(hub, &remote).await?;
            let src = resolve_path(&remote, &src)?;
            let dst = resolve_path(&local, &dst)?;
            let report = transfer_tree(&remote, &src, &local, &dst)?;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_transfer(&report);
            }
        }

        Commands::Connections(command) => run_connections(command, hub, json).await?,

        Commands::Discover { subnet } => {
            let discovery = hub.discovery();
            let hints = match subnet {
                Some(address) => discovery.scan_subnet(address).await?,
                None => discovery.scan().await?,
            };
            if json {
                output::print_json(&hints)?;
            } else {
                output::print_hints(&hints);
            }
        }

        Commands::Config(command) => run_config(command, hub.config(), config_path, json)?,
    }
    Ok(())
}

async fn run_connections(command: ConnectionsCommands, hub: &StorageHub, json: bool) -> Result<()> {
    let registry = hub.registry();
    match command {
        ConnectionsCommands::List => {
            let profiles = registry.get_all()?;
            if json {
                output::print_json(&profiles)?;
            } else {
                output::print_profiles_table(&profiles);
            }
        }

        ConnectionsCommands::Add {
            name,
            host,
            port,
            user,
            password_stdin,
            domain,
            share,
            workgroup,
            anonymous,
            default,
        } => {
            if registry.find_by_name(&name)?.is_some() {
                bail!("A connection named {name} already exists");
            }

            let password = if password_stdin {
                read_password_line()?
            } else {
                String::new()
            };

            let profile = ConnectionProfile::new(name, host)
                .with_port(port.unwrap_or(hub.config().smb.default_port))
                .with_credentials(user.unwrap_or_default(), password)
                .with_domain(domain)
                .with_share(share)
                .with_workgroup(workgroup)
                .with_anonymous(anonymous)
                .with_default(default);
            let id = profile.id;
            let label = profile.name.clone();
            registry.save(profile).context("Failed to save connection")?;

            if json {
                output::print_json(&serde_json::json!({ "id": id, "name": label }))?;
            } else {
                println!("Saved connection {label} ({id})");
            }
        }

        ConnectionsCommands::Remove { connection } => {
            let profile = hub.resolve_profile(&connection)?;
            registry.delete(profile.id)?;
            if !json {
                println!("Removed connection {}", profile.name);
            }
        }

        ConnectionsCommands::SetDefault { connection } => {
            let profile = hub.resolve_profile(&connection)?;
            let updated = registry.set_default(profile.id)?;
            if !json {
                println!("{} is now the default connection", updated.name);
            }
        }

        ConnectionsCommands::Test { connection } => {
            let connected = hub.connect_named(&connection).await?;
            let shares = hub.remote().list("/")?;
            hub.disconnect();
            if json {
                output::print_json(&serde_json::json!({
                    "name": connected.name,
                    "shares": shares.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                }))?;
            } else {
                println!("Connected to {} ({})", connected.name, connected.display_target());
                for share in &shares {
                    println!("  {}", share.name);
                }
            }
        }
    }
    Ok(())
}

fn run_config(command: ConfigCommands, config: &Config, path: &Path, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            if json {
                output::print_json(config)?;
            } else {
                print!("{}", config.to_toml()?);
            }
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            Config::default().save(path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Local storage, or the remote share of a saved connection.
async fn open_backend(hub: &StorageHub, target: &Target) -> Result<Backend> {
    match &target.remote {
        Some(name) => connect_remote(hub, name).await,
        None => Ok(hub.backend(BackendKind::Local)),
    }
}

async fn connect_remote(hub: &StorageHub, connection: &str) -> Result<Backend> {
    let profile = hub
        .connect_named(connection)
        .await
        .with_context(|| format!("Failed to connect to {connection}"))?;
    tracing::debug!(name = %profile.name, "Using remote backend");
    Ok(hub.backend(BackendKind::Remote))
}

/// Make a user-supplied path absolute for the given backend.
fn resolve_path(backend: &Backend, raw: &str) -> Result<String> {
    match backend.kind() {
        BackendKind::Local if !raw.starts_with('/') => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            Ok(cwd.join(raw).to_string_lossy().into_owned())
        }
        BackendKind::Remote if !raw.starts_with('/') => Ok(format!("/{raw}")),
        _ => Ok(raw.to_string()),
    }
}

fn default_dir(backend: &Backend) -> Result<String> {
    match backend.kind() {
        BackendKind::Local => resolve_path(backend, "."),
        BackendKind::Remote => Ok("/".to_string()),
    }
}

fn read_password_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn report_batch(operation: &str, outcome: &batch::BatchOutcome, json: bool) -> Result<()> {
    if json {
        output::print_json(outcome)?;
    } else {
        output::print_batch(operation, outcome);
    }
    if !outcome.is_complete_success() {
        bail!("{} of {} item(s) failed", outcome.failed.len(), outcome.failed.len() + outcome.succeeded);
    }
    Ok(())
}
