//! Seeker CLI - torrent site search with qBittorrent hand-off
//!
//! Searches the configured site directly, through FlareSolverr, or through
//! a shared Chrome instance, ranks what it finds, and queues picks in
//! qBittorrent.

mod app;
mod config;
mod interactive;

use anyhow::{bail, Result};
use app::App;
use clap::{Parser, Subcommand};
use config::Config;
use interactive::Prompter;
use seeker_core::search::describe_result;
use seeker_core::{FetchStrategy, MediaKind, ProgressTracker, QbitConfig, SearchQuery};
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "seeker")]
#[command(author, version, about = "Search a torrent site and queue downloads in qBittorrent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// User running the command (defaults to the OS user)
    #[arg(long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a one-shot ranked search
    Search {
        /// movie or show
        #[arg(short, long)]
        kind: MediaKind,

        /// Title to search for
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        season: Option<u32>,

        #[arg(short, long)]
        episode: Option<u32>,

        /// direct, proxy, browser or headed
        #[arg(short, long, default_value = "direct")]
        mode: FetchStrategy,

        /// Show the browser window (implies --mode browser)
        #[arg(long)]
        headed: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Guided search, then pick results to download
    GoTo {
        /// Queue downloads without following their progress
        #[arg(long)]
        no_track: bool,
    },

    /// Show or set the site to search
    Website {
        url: Option<String>,
    },

    /// Show or set where downloads are saved
    SavePath {
        kind: MediaKind,
        path: Option<String>,
    },

    /// Save qBittorrent credentials and check that they work
    Qbittorrent {
        host: String,
        username: String,
        password: String,
    },

    /// Queue a magnet, `.torrent` or detail page link
    Download {
        url: String,

        #[arg(short, long, default_value = "movie")]
        kind: MediaKind,

        /// Read detail pages through FlareSolverr
        #[arg(long)]
        proxy: bool,

        /// Return once queued
        #[arg(long)]
        no_track: bool,
    },

    /// Show the configuration, or set one value
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    // Commands that write the file start from it without env overrides
    let saved = Config::load()?;
    let mut config = saved.clone();
    config.apply_env();

    let user = cli.user.unwrap_or_else(current_user);
    if !config.is_admin(&user) {
        bail!("{} is not allowed to run seeker commands", user);
    }

    match cli.command {
        Commands::Search {
            kind,
            title,
            season,
            episode,
            mode,
            headed,
            json,
        } => {
            let strategy = if headed {
                FetchStrategy::Browser { headless: false }
            } else {
                mode
            };
            let query = SearchQuery::new(kind, &title, season, episode)?;
            let app = App::new(config)?;
            let result = run_search(&app, &query, strategy, json).await;
            app.shutdown().await;
            result?;
        }
        Commands::GoTo { no_track } => {
            let app = App::new(config)?;
            let stdin = io::stdin();
            let mut prompter = Prompter::new(stdin.lock(), io::stdout());
            let result = interactive::run_go_to(&app, &user, &mut prompter, !no_track).await;
            app.shutdown().await;
            result?;
        }
        Commands::Website { url } => run_website(saved, url)?,
        Commands::SavePath { kind, path } => run_save_path(saved, kind, path)?,
        Commands::Qbittorrent {
            host,
            username,
            password,
        } => run_qbittorrent(saved, &host, &username, &password).await?,
        Commands::Download {
            url,
            kind,
            proxy,
            no_track,
        } => {
            let app = App::new(config)?;
            run_download(&app, &url, kind, proxy, !no_track).await?;
        }
        Commands::Config { key, value } => run_config(saved, key, value)?,
    }

    Ok(())
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

async fn run_search(
    app: &App,
    query: &SearchQuery,
    strategy: FetchStrategy,
    json: bool,
) -> Result<()> {
    let base_url = app.base_url()?;
    let tracker = ProgressTracker::new("search").with_publisher(|rendered| {
        if let Some(last) = rendered.lines().last() {
            eprintln!("{}", last);
        }
    });

    let outcome = match app
        .search
        .search(query, &base_url, &strategy, &tracker)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracker.fail(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    };

    if json {
        let output = serde_json::json!({
            "term": outcome.term,
            "url": outcome.page_url,
            "results": outcome.results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if outcome.results.is_empty() {
        println!("No matches for \"{}\".", outcome.term);
        return Ok(());
    }
    for (i, result) in outcome.results.iter().enumerate() {
        println!("{}", describe_result(i, result));
        if let Some(ref link) = result.detail_url {
            println!("   {}", link);
        }
    }
    Ok(())
}

fn run_website(mut config: Config, url: Option<String>) -> Result<()> {
    match url {
        Some(url) => {
            config.set("website", &url)?;
            config.save()?;
            if let Some(ref saved) = config.site.url {
                println!("✅ Website set to {}", saved);
            }
        }
        None => match config.site.url {
            Some(url) => println!("{}", url),
            None => println!("No website configured."),
        },
    }
    Ok(())
}

fn run_save_path(mut config: Config, kind: MediaKind, path: Option<String>) -> Result<()> {
    match path {
        Some(path) => {
            config.set_save_path(kind, &path)?;
            config.save()?;
            println!(
                "✅ {} downloads will be saved to {}",
                kind,
                config.save_paths().get(kind)
            );
        }
        None => println!("{}", config.save_paths().get(kind)),
    }
    Ok(())
}

async fn run_qbittorrent(
    mut config: Config,
    host: &str,
    username: &str,
    password: &str,
) -> Result<()> {
    let qbit_config = QbitConfig::new(host, username, password)?;
    config.qbittorrent.host = Some(qbit_config.host.clone());
    config.qbittorrent.username = Some(qbit_config.username.clone());
    config.qbittorrent.password = Some(qbit_config.password.clone());

    let app = App::new(config.clone())?;
    app.qbit.configure(qbit_config);
    app.qbit.login().await?;

    config.save()?;
    println!("✅ Connected to qBittorrent at {}", host);
    Ok(())
}

async fn run_download(
    app: &App,
    url: &str,
    kind: MediaKind,
    use_proxy: bool,
    track: bool,
) -> Result<()> {
    if !app.qbit.is_configured() {
        bail!("qBittorrent is not configured. Run `seeker qbittorrent <host> <user> <pass>` first.");
    }

    let link = app.search.resolve_link(url, use_proxy).await?;
    let submitted = app.send_to_qbittorrent(&link, kind, url).await?;
    println!("✅ Sent to qBittorrent (tag {})", submitted.tag);

    if track {
        let sink = |message: &str| eprintln!("{}", message);
        app.track_downloads(&[submitted], &sink).await;
    }
    Ok(())
}

fn run_config(mut config: Config, key: Option<String>, value: Option<String>) -> Result<()> {
    match (key, value) {
        (Some(key), Some(value)) => {
            config.set(&key, &value)?;
            config.save()?;
            println!("✅ {} updated", key);
        }
        (Some(key), None) => bail!("Missing value for {}", key),
        (None, _) => {
            if let Some(path) = Config::config_path() {
                println!("# {}", path.display());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
