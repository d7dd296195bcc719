//! zotero-rag CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zotero_rag::{
    commands::{
        cmd_index, cmd_init, cmd_libraries, cmd_library_status, cmd_query, cmd_reset, cmd_status,
        print_index_stats, print_init, print_libraries, print_library_status, print_query_result,
        print_reset, print_status, IndexOptions, InitOptions, QueryOptions,
    },
    config::Config,
    context::AppContext,
    error::{Error, Result},
    models::{AnswerFormat, RequestedMode},
    progress::LogWriterFactory,
    server::run_server,
    store::SearchFilter,
};

#[derive(Parser)]
#[command(name = "zotero-rag")]
#[command(version, about = "Ask questions of your Zotero library with cited answers", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the metadata database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,

        /// Start from a named preset (cpu-only, gpu-high-memory, remote-openai, ...)
        #[arg(long)]
        preset: Option<String>,
    },

    /// List the libraries Zotero exposes
    Libraries,

    /// Index a library
    Index {
        /// Library id (see 'zotero-rag libraries'; 0 is your personal library)
        library_id: String,

        /// auto, incremental or full
        #[arg(long, default_value = "auto")]
        mode: RequestedMode,

        /// Stop after this many items with PDFs
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Show index status
    Status {
        /// Only this library
        library_id: Option<String>,
    },

    /// Rebuild a library from scratch on its next index run
    Reset {
        library_id: String,
    },

    /// Ask a question
    Query {
        /// The question
        question: String,

        /// Libraries to search (default: all indexed)
        #[arg(short, long)]
        library: Vec<String>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity score (0-1)
        #[arg(short, long)]
        min_score: Option<f32>,

        /// Only chunks by these authors
        #[arg(long)]
        author: Vec<String>,

        /// Earliest publication year
        #[arg(long)]
        year_min: Option<i32>,

        /// Latest publication year
        #[arg(long)]
        year_max: Option<i32>,

        /// Only these Zotero item types (journalArticle, book, ...)
        #[arg(long)]
        item_type: Vec<String>,

        /// Only items with these tags
        #[arg(long)]
        tag: Vec<String>,

        /// plain, markdown or html
        #[arg(long)]
        format: Option<AnswerFormat>,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "zotero-rag", &mut std::io::stdout());
        return Ok(());
    }

    if let Commands::Init { force, preset } = &cli.command {
        let (base_dir, config_path) = init_paths(cli.config.as_deref());
        let config = cmd_init(InitOptions {
            base_dir,
            config_path,
            force: *force,
            preset: preset.clone(),
        })
        .await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            print_init(&config);
        }
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.server.bind = bind.clone();
    }
    let ctx = AppContext::from_config(config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Libraries => {
            let libraries = cmd_libraries(&ctx).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&libraries)?);
            } else {
                print_libraries(&libraries);
            }
        }

        Commands::Index {
            library_id,
            mode,
            max_items,
        } => {
            let options = IndexOptions {
                mode,
                max_items,
                show_progress: !cli.json,
            };
            let stats = cmd_index(&ctx, &library_id, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_index_stats(&library_id, &stats);
            }
        }

        Commands::Status { library_id } => match library_id {
            Some(id) => {
                let status = cmd_library_status(&ctx, &id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print_library_status(&status);
                }
            }
            None => {
                let status = cmd_status(&ctx).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print_status(&status);
                }
            }
        },

        Commands::Reset { library_id } => {
            let flagged = cmd_reset(&ctx, &library_id).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "library_id": library_id, "reset": flagged })
                );
            } else {
                print_reset(&library_id, flagged);
            }
        }

        Commands::Query {
            question,
            library,
            top_k,
            min_score,
            author,
            year_min,
            year_max,
            item_type,
            tag,
            format,
        } => {
            let options = QueryOptions {
                library_ids: library,
                top_k,
                min_score,
                filters: SearchFilter {
                    library_ids: Vec::new(),
                    authors: author,
                    year_min,
                    year_max,
                    item_types: item_type,
                    tags: tag,
                },
                format,
            };

            let result = cmd_query(&ctx, &question, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_query_result(&result);
            }
        }

        Commands::Serve { .. } => run_server(ctx).await?,
    }

    Ok(())
}

/// Base directory and config file for `init`.
///
/// `--config` may name a `.toml` file or a directory.
fn init_paths(config: Option<&Path>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path.to_path_buf())
        }
        Some(dir) => (dir.to_path_buf(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            let config_path = base.join("config.toml");
            (base, config_path)
        }
    }
}

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::load_from(None)?,
    };

    if !config.paths.config_file.exists() {
        return Err(Error::NotInitialized);
    }

    Ok(config)
}
