//! # gaudy
//!
//! Runs one side of a collaborative browsing session. Commands are read from
//! stdin, one per line: `go <url>`, `back`, `forward`, `follow <n>`, `reload`,
//! `links`, `show`, `quit`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use browser::{
    Collaborator, Command, Conductor, FrameFormat, HttpFetcher, SessionConfig, TextSurface,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Collaborative toy browser.
#[derive(Parser, Debug)]
#[command(name = "gaudy", about = "Collaborative toy browser")]
struct Cli {
    /// JSON session config; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Fetch pages and lead the session.
    Conduct {
        /// Address to listen on.
        #[arg(long)]
        bind: Option<String>,

        /// Page to open at startup.
        #[arg(long)]
        homepage: Option<String>,

        #[command(flatten)]
        link: LinkArgs,
    },
    /// Mirror a Conductor's page.
    Collaborate {
        /// Conductor host.
        #[arg(long)]
        host: Option<String>,

        #[command(flatten)]
        link: LinkArgs,
    },
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Collaboration port (default 10000).
    #[arg(long)]
    port: Option<u16>,

    /// Name announced to the other side.
    #[arg(long)]
    name: Option<String>,

    /// Use length-prefixed frames; both sides must agree.
    #[arg(long)]
    length_prefixed: bool,
}

impl LinkArgs {
    fn apply(&self, config: &mut SessionConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if self.length_prefixed {
            config.frame_format = FrameFormat::LengthPrefixed;
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Forward parsed stdin lines to the session until stdin closes
fn spawn_command_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    });
    rx
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let commands = spawn_command_reader();
    let surface = Box::new(TextSurface::stdout());

    match cli.role {
        Role::Conduct {
            bind,
            homepage,
            link,
        } => {
            if let Some(bind) = bind {
                config.host = bind;
            }
            if homepage.is_some() {
                config.homepage = homepage;
            }
            link.apply(&mut config);

            let fetcher = Box::new(
                HttpFetcher::new(config.fetch_timeout())
                    .context("Failed to set up the HTTP client")?,
            );
            let mut conductor = Conductor::new(config, fetcher, surface);
            let addr = conductor
                .bind()
                .await
                .context("Failed to listen for collaborators")?;
            eprintln!("conducting on {}", addr);

            tokio::select! {
                result = conductor.run(commands) => result?,
                _ = tokio::signal::ctrl_c() => conductor.shutdown(),
            }
        }
        Role::Collaborate { host, link } => {
            if let Some(host) = host {
                config.host = host;
            }
            link.apply(&mut config);

            let target = format!("{}:{}", config.host, config.port);
            let mut collaborator = Collaborator::connect(config, surface)
                .await
                .with_context(|| format!("Failed to reach conductor at {}", target))?;

            tokio::select! {
                result = collaborator.run(commands) => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    Ok(())
}
