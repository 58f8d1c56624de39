//! kura command-line driver.
//!
//! Runs one filesystem tool call against a configured backend and prints the
//! JSON response.
//!
//! Usage:
//!   kura --root ./workspace ls /
//!   kura --config kura.toml --virtual read /notes/todo.md --offset 100
//!   echo "hello" | kura --root . write /hello.txt
//!   kura --root . grep TODO --glob '*.rs' --mode content
//!   kura --root . edit /a.txt old new --all

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kura_store::{FilesystemTools, KuraConfig, OutputMode, ToolResponse, shared_files};

/// Storage backends for agent tooling.
#[derive(Parser, Debug)]
#[command(name = "kura")]
#[command(about = "Run filesystem tool calls against kura storage backends")]
struct Args {
    /// TOML config describing the disk root and routes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disk root (overrides the config file); paths are confined to it
    #[arg(long)]
    root: Option<PathBuf>,

    /// Confine all paths to the disk root from the config file
    #[arg(long = "virtual")]
    virtual_mode: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Read a file with line numbers
    Read {
        path: String,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create a new file; content is read from stdin when not given
    Write { path: String, content: Option<String> },
    /// Replace text in a file
    Edit {
        path: String,
        old: String,
        new: String,
        /// Replace every occurrence
        #[arg(long = "all")]
        replace_all: bool,
    },
    /// Literal text search
    Grep {
        pattern: String,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        glob: Option<String>,
        #[arg(long, value_enum, default_value_t = Mode::Files)]
        mode: Mode,
    },
    /// Find files by glob pattern
    Glob {
        pattern: String,
        #[arg(long)]
        path: Option<String>,
    },
}

/// Grep rendering.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    /// Unique matching paths
    Files,
    /// path:line:text per match
    Content,
    /// Match count per path
    Count,
}

impl From<Mode> for OutputMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Files => OutputMode::FilesWithMatches,
            Mode::Content => OutputMode::Content,
            Mode::Count => OutputMode::Count,
        }
    }
}

fn load_config(args: &Args) -> Result<KuraConfig> {
    let mut config = match &args.config {
        Some(path) => KuraConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => KuraConfig::default(),
    };
    if let Some(root) = &args.root {
        config.filesystem.root_dir = Some(root.clone());
    }
    if args.virtual_mode || args.root.is_some() {
        config.filesystem.virtual_mode = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    // One-shot process: the state and store maps live only for this call.
    let state = shared_files();
    let backend = config
        .build_backend(Arc::clone(&state), shared_files())
        .context("building backend")?;
    tracing::debug!(?backend, "backend ready");
    let tools = FilesystemTools::new(backend, state).with_read_limit(config.read_limit);

    let response = match args.command {
        Command::Ls { path } => tools.ls(&path).await,
        Command::Read {
            path,
            offset,
            limit,
        } => tools.read_file(&path, offset, limit).await,
        Command::Write { path, content } => {
            let content = match content {
                Some(c) => c,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("reading content from stdin")?;
                    buf
                }
            };
            tools.write_file(&path, &content).await
        }
        Command::Edit {
            path,
            old,
            new,
            replace_all,
        } => tools.edit_file(&path, &old, &new, replace_all).await,
        Command::Grep {
            pattern,
            path,
            glob,
            mode,
        } => {
            tools
                .grep(&pattern, path.as_deref(), glob.as_deref(), mode.into())
                .await
        }
        Command::Glob { pattern, path } => tools.glob(&pattern, path.as_deref()).await,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if let ToolResponse::Error { message } = &response {
        tracing::warn!(%message, "tool call failed");
        std::process::exit(1);
    }
    Ok(())
}
