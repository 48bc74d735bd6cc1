// src/main.rs

use anyhow::Result;
use apkget::config::{DEFAULT_ROOT, DEFAULT_TIMEOUT};
use apkget::install::InstallOutcome;
use apkget::query::SearchOptions;
use apkget::repository::DownloadProgress;
use apkget::{Error, Repo, RepoConfig};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "apkget")]
#[command(author, version, about = "A simple package manager for Android APKs", long_about = None)]
struct Cli {
    /// Local root directory
    #[arg(short, long, global = true, env = "APKGET_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// Remote index URL (a URL ending in '/' gets index.json appended)
    #[arg(long, global = true, env = "APKGET_REPO")]
    repo: Option<String>,

    /// Native ABIs to keep on install (default: all known ABIs)
    #[arg(long = "abi", global = true, value_delimiter = ',')]
    abis: Vec<String>,

    /// Transport timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the index from the remote repository
    Update,
    /// Search packages by regular expression
    Search {
        /// Case-insensitive pattern matched against name, title and path
        #[arg(default_value = ".")]
        pattern: String,
        /// Match the package name only
        #[arg(short, long)]
        name_only: bool,
        /// Show only the latest version of each package
        #[arg(short, long)]
        latest: bool,
        /// Show only installed packages
        #[arg(short, long)]
        installed: bool,
    },
    /// Show the index entry of a package
    Info {
        /// Package name
        name: String,
    },
    /// Download packages into the cache
    Fetch {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Install packages
    Install {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
        /// Replace an existing installation
        #[arg(long)]
        reinstall: bool,
    },
    /// Uninstall packages
    Uninstall {
        /// Package names
        #[arg(required_unless_present = "all")]
        names: Vec<String>,
        /// Succeed even if a package is not installed
        #[arg(short, long)]
        force: bool,
        /// Uninstall every installed package
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },
    /// List installed packages
    List,
    /// Remove all cached packages, keeping the index
    Clean,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Download progress drawn as a bar on stderr
#[derive(Default)]
struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl DownloadProgress for ProgressReporter {
    fn start(&mut self, label: &str, total_chunks: u64) {
        let bar = if total_chunks > 0 {
            ProgressBar::new(total_chunks)
        } else {
            ProgressBar::new_spinner()
        };
        let style = ProgressStyle::with_template("{msg:30!} [{bar:40}] {pos}/{len} chunks")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(label.to_string());
        self.bar = Some(bar);
    }

    fn update(&mut self, done_chunks: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(done_chunks);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

fn build_config(cli: &Cli) -> RepoConfig {
    let mut config = RepoConfig::new(&cli.root).with_timeout(Duration::from_secs(cli.timeout));
    if let Some(url) = &cli.repo {
        config = config.with_index_url(url);
    }
    if !cli.abis.is_empty() {
        config = config.with_abis(cli.abis.iter().cloned());
    }
    config
}

/// Print the per-target result line
///
/// Returns whether the target succeeded. An unavailable index stops the
/// whole batch.
fn report<T>(
    action: &str,
    name: &str,
    result: apkget::Result<T>,
    ok: impl Fn(&T) -> bool,
) -> Result<bool> {
    match result {
        Ok(value) if ok(&value) => {
            println!("{} {} success", action, name);
            Ok(true)
        }
        Ok(_) => {
            println!("{} {} fail", action, name);
            Ok(false)
        }
        Err(e @ Error::IndexUnavailable(_)) => Err(e.into()),
        Err(e) => {
            println!("{} {} fail: {}", action, name, e);
            Ok(false)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = build_config(&cli);

    let Some(command) = cli.command else {
        // No command provided, show help
        println!("apkget v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'apkget --help' for usage information");
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "apkget", &mut std::io::stdout());
        return Ok(());
    }

    let mut repo = Repo::open(config)?;
    let mut all_ok = true;

    match command {
        Commands::Update => match repo.update() {
            Ok(count) => println!("update success ({} packages)", count),
            Err(e) => {
                println!("update fail: {}", e);
                all_ok = false;
            }
        },
        Commands::Search {
            pattern,
            name_only,
            latest,
            installed,
        } => {
            let options = SearchOptions {
                name_only,
                latest_only: latest,
                installed_only: installed,
            };
            for hit in repo.search(&pattern, options)? {
                println!(
                    "{}{} {:50} {}",
                    if hit.installed { 'i' } else { '-' },
                    if hit.cached { 'c' } else { '-' },
                    hit.identity,
                    hit.entry.title.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Info { name } => {
            let identity = repo.expand(&name, false)?;
            let entry = repo.entry(&identity)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            println!("identity:  {}", identity);
            println!("cached:    {}", repo.cache().is_cached(&entry));
            println!("installed: {}", repo.is_installed(&identity));
        }
        Commands::Fetch { names } => {
            for name in names {
                let identity = repo.expand(&name, false)?;
                info!("Fetching {}", identity);
                let mut progress = ProgressReporter::default();
                let result = repo.fetch(&identity, &mut progress);
                all_ok &= report("fetch", &identity, result, |_| true)?;
            }
        }
        Commands::Install { names, reinstall } => {
            for name in names {
                let identity = repo.expand(&name, false)?;
                info!("Installing {}", identity);
                let mut progress = ProgressReporter::default();
                let result = repo.install(&identity, reinstall, &mut progress);
                if let Ok(InstallOutcome::AlreadyInstalled) = &result {
                    println!("{} is already installed (use --reinstall to replace it)", identity);
                }
                all_ok &= report("install", &identity, result, InstallOutcome::is_success)?;
            }
        }
        Commands::Uninstall { names, force, all } => {
            let targets = if all {
                let swept = repo.sweep_staging()?;
                if swept > 0 {
                    info!("Removed {} interrupted installs", swept);
                }
                repo.installed()?
            } else {
                names
            };
            for name in targets {
                // Uninstalling never requires the index
                let identity = if repo.is_installed(&name) {
                    name
                } else {
                    match repo.expand(&name, true) {
                        Ok(identity) => identity,
                        Err(e) => {
                            warn!("Not expanding {}: {}", name, e);
                            name
                        }
                    }
                };
                let result = repo.uninstall(&identity, force);
                all_ok &= report("uninstall", &identity, result, |o| o.is_success())?;
            }
        }
        Commands::List => {
            for identity in repo.installed()? {
                println!("{}", identity);
            }
        }
        Commands::Clean => {
            repo.clean()?;
            println!("clean success");
        }
        // Handled before the repository is opened
        Commands::Completions { .. } => {}
    }

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_with_abis() {
        let cli = Cli::try_parse_from([
            "apkget",
            "--root",
            "/tmp/apps",
            "install",
            "firefox",
            "--abi",
            "arm64-v8a,armeabi-v7a",
            "--reinstall",
        ])
        .unwrap();

        let config = build_config(&cli);
        assert_eq!(config.root, PathBuf::from("/tmp/apps"));
        assert_eq!(config.abis, vec!["arm64-v8a", "armeabi-v7a"]);
        match cli.command {
            Some(Commands::Install { names, reinstall }) => {
                assert_eq!(names, vec!["firefox"]);
                assert!(reinstall);
            }
            _ => panic!("expected install command"),
        }
    }

    #[test]
    fn test_default_abis_keep_everything() {
        let cli = Cli::try_parse_from(["apkget", "list"]).unwrap();
        let config = build_config(&cli);
        assert_eq!(config.abis, RepoConfig::default().abis);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_search_defaults_to_match_all() {
        let cli = Cli::try_parse_from(["apkget", "search", "--latest"]).unwrap();
        match cli.command {
            Some(Commands::Search {
                pattern, latest, ..
            }) => {
                assert_eq!(pattern, ".");
                assert!(latest);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_uninstall_requires_names_or_all() {
        assert!(Cli::try_parse_from(["apkget", "uninstall"]).is_err());
        assert!(Cli::try_parse_from(["apkget", "uninstall", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["apkget", "uninstall", "--all", "x"]).is_err());
    }
}
