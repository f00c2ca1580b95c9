//! # semse CLI
//!
//! ## Usage
//!
//! ```bash
//! semse --config ./config/semse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `semse init` | Create the store tables and the document index |
//! | `semse structure <folder>` | Text files → document records |
//! | `semse embed <folder>` | Add embeddings to document records |
//! | `semse keys <folder> -p <prefix>` | Wrap records under freshly minted keys |
//! | `semse import <folder>` | Write keyed records into the store |
//! | `semse export <pattern> -d <dest>` | Read stored records back out to files |
//! | `semse search "<query>"` | Nearest-neighbor search |
//! | `semse serve` | Start the HTTP query server |
//!
//! ## Example
//!
//! ```bash
//! semse structure ./raw -d ./records
//! semse embed ./records
//! semse keys ./records -p documents -d ./keyed --flatten
//! semse import ./keyed
//! semse search "rust async runtimes" --count 3
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use semse::config;
use semse::progress::ProgressMode;
use semse::stage::StageOptions;
use semse::walker::Walker;
use semse::{embed_cmd, export, import, keying, migrate, search, server, structure};

/// semse: turn a folder of articles into an embedded, searchable store.
#[derive(Parser)]
#[command(name = "semse", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/semse.toml`
    /// when present, otherwise built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Per-file progress on stderr. Defaults to human when stderr is a TTY,
    /// otherwise JSON lines.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by the file stages.
#[derive(Args)]
struct StageArgs {
    /// Source directory.
    folder: PathBuf,

    /// Destination directory. Defaults to the source directory.
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Overwrite outputs that already exist.
    #[arg(short, long)]
    force: bool,

    /// Report what would happen without calling services or writing.
    #[arg(short, long)]
    simulate: bool,

    #[command(flatten)]
    walk: WalkArgs,
}

#[derive(Args)]
struct WalkArgs {
    /// Visit at most this many files.
    #[arg(long)]
    limit: Option<usize>,

    /// Only visit files matching this glob (relative to the folder). Repeatable.
    #[arg(long)]
    include: Vec<String>,

    /// Skip files matching this glob. Repeatable.
    #[arg(long)]
    exclude: Vec<String>,
}

impl WalkArgs {
    fn walker(&self, folder: &Path) -> anyhow::Result<Walker> {
        Ok(Walker::new(folder)
            .with_limit(self.limit)
            .with_globs(&self.include, &self.exclude)?)
    }
}

impl StageArgs {
    fn options(&self) -> StageOptions {
        StageOptions::new(&self.folder, self.dest.clone())
            .force(self.force)
            .simulate(self.simulate)
    }

    fn walker(&self) -> anyhow::Result<Walker> {
        self.walk.walker(&self.folder)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store tables and the document index. Idempotent.
    Init,

    /// Convert text files into document records via the completion service.
    Structure(StageArgs),

    /// Add an embedding to every document record that lacks one.
    Embed(StageArgs),

    /// Assign a unique `<prefix>:<uuid>` key to every document record.
    Keys {
        #[command(flatten)]
        stage: StageArgs,

        /// Key prefix.
        #[arg(short, long)]
        prefix: String,

        /// Write outputs flat into the destination, named after their key.
        #[arg(long)]
        flatten: bool,
    },

    /// Write keyed records into the store.
    Import {
        /// Source directory of keyed records.
        folder: PathBuf,

        /// Index name. Overrides `index.name`.
        #[arg(short, long)]
        index: Option<String>,

        /// Key prefix covered by the index. Overrides `index.prefix`.
        #[arg(short, long)]
        prefix: Option<String>,

        /// Overwrite entries that already exist.
        #[arg(short, long)]
        force: bool,

        /// Report what would happen without writing.
        #[arg(short, long)]
        simulate: bool,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Write stored records whose key matches a glob pattern to files.
    Export {
        /// Key glob, e.g. `documents:*`.
        pattern: String,

        /// Destination directory.
        #[arg(short, long)]
        dest: PathBuf,

        /// Overwrite files that already exist.
        #[arg(short, long)]
        force: bool,
    },

    /// Find the stored documents closest to a query.
    Search {
        query: String,

        /// Number of results. Defaults to `server.default_count`.
        #[arg(long)]
        count: Option<usize>,

        /// Number of leading results to skip.
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP query server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut cfg = config::load_config(cli.config.as_deref())?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
        }
        Commands::Structure(args) => {
            structure::run_structure(&cfg, &args.walker()?, args.options(), progress).await?;
        }
        Commands::Embed(args) => {
            embed_cmd::run_embed(&cfg, &args.walker()?, args.options(), progress).await?;
        }
        Commands::Keys {
            stage,
            prefix,
            flatten,
        } => {
            keying::run_keys(&stage.walker()?, stage.options(), &prefix, flatten, progress)
                .await?;
        }
        Commands::Import {
            folder,
            index,
            prefix,
            force,
            simulate,
            walk,
        } => {
            if let Some(index) = index {
                cfg.index.name = index;
            }
            if let Some(prefix) = prefix {
                cfg.index.prefix = prefix;
            }
            let cfg = config::finish(cfg, |_| None)?;
            let options = StageOptions::new(&folder, None)
                .force(force)
                .simulate(simulate);
            import::run_import(&cfg, &walk.walker(&folder)?, options, progress).await?;
        }
        Commands::Export {
            pattern,
            dest,
            force,
        } => {
            export::run_export(&cfg, &pattern, &dest, force, progress).await?;
        }
        Commands::Search {
            query,
            count,
            start,
            json,
        } => {
            search::run_search(&cfg, &query, count, start, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
