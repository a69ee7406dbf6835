use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use coderag_core::bootstrap::{self, OllamaPipeline};
use coderag_core::{Config, CurrentFile, QueryRequest};
use coderag_index::chunker::ChunkKind;
use coderag_index::{Lang, ScoredChunk, SearchFilter, VectorIndex};

#[derive(Parser)]
#[command(name = "coderag")]
#[command(about = "Local code index and retrieval-augmented answers over a repository")]
#[command(version)]
struct Cli {
    /// Config file (default: $CODERAG_CONFIG or config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index or update a repository
    Index {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Re-embed every file regardless of recorded hashes
        #[arg(long)]
        force: bool,
    },
    /// Answer a question using retrieved code as context
    Query {
        text: String,
        #[command(flatten)]
        search: SearchArgs,
        /// File whose content is sent alongside the query
        #[arg(long)]
        current_file: Option<PathBuf>,
    },
    /// Show ranked chunks for a query without generating
    Search {
        text: String,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// List indexed repositories, or the files of one
    List { path: Option<PathBuf> },
    /// Index, then follow changes until interrupted
    Watch {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Remove a repository from the index
    Clear {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Repository root
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Number of chunks (default depends on the query intent)
    #[arg(short = 'n', long)]
    limit: Option<usize>,
    /// Only chunks in this language
    #[arg(short = 'l', long)]
    language: Option<String>,
    /// Only files matching this glob
    #[arg(short = 'g', long)]
    glob: Option<String>,
    /// Only chunks of this kind (function, size-based-fragment, function-part)
    #[arg(long)]
    kind: Option<String>,
}

impl SearchArgs {
    fn filter(&self) -> anyhow::Result<SearchFilter> {
        let mut filter = SearchFilter::default();
        if let Some(id) = &self.language {
            let lang = Lang::from_id(&id.to_ascii_lowercase())
                .with_context(|| format!("unknown language: {id}"))?;
            filter = filter.with_language(lang);
        }
        if let Some(kind) = &self.kind {
            let kind = ChunkKind::parse(kind).with_context(|| format!("unknown chunk kind: {kind}"))?;
            filter = filter.with_kind(kind);
        }
        if let Some(glob) = &self.glob {
            filter = filter.with_path_glob(glob)?;
        }
        Ok(filter)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = bootstrap::resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Index { path, force } => {
            bootstrap::health_check(&bootstrap::create_backend(&config)).await;
            let pipeline = bootstrap::build_ollama_pipeline(&config, &path).await?;
            run_index(&pipeline, force).await
        }
        Command::Query {
            text,
            search,
            current_file,
        } => run_query(&config, &text, &search, current_file.as_deref()).await,
        Command::Search { text, search } => run_search(&config, &text, &search).await,
        Command::List { path } => run_list(&config, path.as_deref()).await,
        Command::Watch { path } => run_watch(&config, &path).await,
        Command::Clear { path } => {
            let pipeline = bootstrap::build_ollama_pipeline(&config, &path).await?;
            if pipeline.clear().await? {
                println!("removed {}", pipeline.root().display());
            } else {
                println!("{} was not indexed", pipeline.root().display());
            }
            Ok(())
        }
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// One result line: score, location, kind and name when known.
fn format_hit(hit: &ScoredChunk) -> String {
    let chunk = &hit.chunk;
    let mut line = format!(
        "{:.3}  {}:{}-{}  {}",
        hit.score, chunk.file_path, chunk.line_range.0, chunk.line_range.1, chunk.kind.as_str()
    );
    if let Some(name) = &chunk.name {
        line.push(' ');
        line.push_str(name);
    }
    line
}

async fn run_index(pipeline: &OllamaPipeline, force: bool) -> anyhow::Result<()> {
    let report = pipeline.index_repository(force).await?;
    println!(
        "{} files scanned: {} indexed, {} unchanged, {} removed ({} chunks embedded, {} reused, {} removed) in {} ms",
        report.files_scanned,
        report.files_indexed,
        report.files_unchanged,
        report.files_removed,
        report.chunks_embedded,
        report.chunks_reused,
        report.chunks_removed,
        report.duration_ms,
    );
    for error in &report.errors {
        eprintln!("skipped: {error}");
    }
    Ok(())
}

async fn run_query(
    config: &Config,
    text: &str,
    args: &SearchArgs,
    current_file: Option<&Path>,
) -> anyhow::Result<()> {
    let pipeline = bootstrap::build_ollama_pipeline(config, &args.path).await?;
    let current_file = match current_file {
        Some(path) => Some(CurrentFile {
            path: Some(path.display().to_string()),
            content: tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?,
        }),
        None => None,
    };
    let request = QueryRequest {
        text: text.to_owned(),
        limit: args.limit,
        filter: args.filter()?,
        current_file,
    };

    let answer = pipeline.answer(&request).await?;
    println!("{}", answer.response.trim_end());
    if !answer.sources.is_empty() {
        println!();
        println!("[{}] sources:", answer.intent);
        for hit in &answer.sources {
            println!("  {}", format_hit(hit));
        }
    }
    Ok(())
}

async fn run_search(config: &Config, text: &str, args: &SearchArgs) -> anyhow::Result<()> {
    let pipeline = bootstrap::build_ollama_pipeline(config, &args.path).await?;
    let request = QueryRequest {
        text: text.to_owned(),
        limit: args.limit,
        filter: args.filter()?,
        current_file: None,
    };
    let result = pipeline.search(&request).await?;
    if result.is_empty() {
        println!("no results");
        return Ok(());
    }
    for hit in &result.chunks {
        println!("{}", format_hit(hit));
    }
    Ok(())
}

async fn run_list(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        let pipeline = bootstrap::build_ollama_pipeline(config, path).await?;
        let Some(info) = pipeline.info().await? else {
            bail!("{} is not indexed", pipeline.root().display());
        };
        for file in &info.files {
            println!(
                "{}\t{}\t{} chunks",
                file.path,
                file.language.map_or("unknown", |l| l.id()),
                file.chunk_count
            );
        }
        return Ok(());
    }

    let index = bootstrap::open_index(config).await?;
    let collections = index.list().await?;
    if collections.is_empty() {
        println!("nothing indexed");
    }
    for c in collections {
        let chunks: usize = c.files.iter().map(|f| f.chunk_count).sum();
        println!("{}\t{} files\t{chunks} chunks\t{}", c.root, c.files.len(), c.name);
    }
    Ok(())
}

async fn run_watch(config: &Config, path: &Path) -> anyhow::Result<()> {
    bootstrap::health_check(&bootstrap::create_backend(config)).await;
    let pipeline = bootstrap::build_ollama_pipeline(config, path).await?;
    run_index(&pipeline, false).await?;

    let (watcher, mut events) = pipeline.watch(config.watch_debounce())?;
    println!("watching {} (ctrl-c to stop)", pipeline.root().display());
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                pipeline.invalidate();
                println!(
                    "{}: {} embedded, {} reused, {} removed",
                    event.path.display(),
                    event.report.chunks_embedded,
                    event.report.chunks_reused,
                    event.report.chunks_removed,
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    watcher.stop();
    Ok(())
}
