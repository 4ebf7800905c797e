use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search_core::persist::{load_index, load_meta, save_index, IndexFormat, IndexPaths};
use search_core::document::DEFAULT_MANIFEST;
use search_core::report::{append_response, format_response, Analytics};
use search_core::{BuildOptions, IndexBuilder, IndexStore, PagesDirectory, RankingConfig, SearchEngine, TextTokenizer};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a TF-IDF inverted index over stored web pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of HTML pages
    Build {
        /// Corpus root holding the pages
        #[arg(long)]
        pages: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Manifest mapping page locations to URLs, relative to --pages
        #[arg(long, default_value = "bookkeeping.json")]
        manifest: PathBuf,
        /// Persisted format: json or bincode
        #[arg(long, default_value_t = IndexFormat::Json)]
        format: IndexFormat,
        /// Index manifest entries whose URL has a #fragment
        #[arg(long, default_value_t = false)]
        keep_fragment_urls: bool,
    },
    /// Print the analytics table of an index
    Stats {
        #[arg(long)]
        index: PathBuf,
    },
    /// Answer queries; interactive when --query is not given
    Search {
        #[arg(long)]
        index: PathBuf,
        /// Rebuild from these pages when the index cannot be loaded
        #[arg(long)]
        pages: Option<PathBuf>,
        #[arg(long)]
        query: Option<String>,
        /// Number of results to show
        #[arg(long)]
        top_k: Option<usize>,
        /// JSON file with ranking settings
        #[arg(long)]
        ranking_config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { pages, output, manifest, format, keep_fragment_urls } => {
            let options = BuildOptions { skip_fragment_urls: !keep_fragment_urls };
            let paths = IndexPaths::new(&output);
            let store = build(&pages, &manifest, &paths, format, options)?;
            write_analytics(&paths, &store, format)
        }
        Commands::Stats { index } => {
            let paths = IndexPaths::new(&index);
            let store = load_index(&paths)?;
            let meta = load_meta(&paths)?;
            print!("{}", Analytics::collect(&store, &paths.index(meta.format))?);
            Ok(())
        }
        Commands::Search { index, pages, query, top_k, ranking_config } => {
            let paths = IndexPaths::new(&index);
            let store = load_or_build(&paths, pages.as_deref())?;
            let mut config = read_ranking_config(ranking_config.as_deref())?;
            if let Some(k) = top_k {
                config.top_k = k;
            }
            let engine = SearchEngine::new(TextTokenizer, config);
            match query {
                Some(q) => answer(&engine, &store, &paths, &q),
                None => repl(&engine, &store, &paths),
            }
        }
    }
}

fn build(pages: &Path, manifest: &Path, paths: &IndexPaths, format: IndexFormat, options: BuildOptions) -> Result<IndexStore> {
    let source = PagesDirectory::new(pages).with_manifest(manifest);
    let store = IndexBuilder::new(TextTokenizer)
        .with_options(options)
        .build_from_source(&source)
        .with_context(|| format!("building index from {}", pages.display()))?;

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    save_index(paths, &store, format, created_at)?;
    Ok(store)
}

fn load_or_build(paths: &IndexPaths, pages: Option<&Path>) -> Result<IndexStore> {
    match (load_index(paths), pages) {
        (Ok(store), _) => Ok(store),
        (Err(err), Some(pages)) => {
            tracing::warn!(error = %err, "could not load index, rebuilding");
            let store = build(pages, Path::new(DEFAULT_MANIFEST), paths, IndexFormat::Json, BuildOptions::default())?;
            write_analytics(paths, &store, IndexFormat::Json)?;
            Ok(store)
        }
        (Err(err), None) => Err(err).with_context(|| format!("loading index from {}", paths.root.display())),
    }
}

fn write_analytics(paths: &IndexPaths, store: &IndexStore, format: IndexFormat) -> Result<()> {
    let analytics = Analytics::collect(store, &paths.index(format))?;
    fs::write(paths.analytics(), analytics.to_string())?;
    print!("{analytics}");
    Ok(())
}

fn read_ranking_config(path: Option<&Path>) -> Result<RankingConfig> {
    let Some(path) = path else { return Ok(RankingConfig::default()) };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn answer(engine: &SearchEngine, store: &IndexStore, paths: &IndexPaths, query: &str) -> Result<()> {
    let start = std::time::Instant::now();
    let results = engine.search(query, store);
    print!("{}", format_response(query, results.as_ref()));
    println!("Time taken: {:?}", start.elapsed());
    append_response(&paths.query_log(), query, results.as_ref())?;
    Ok(())
}

fn repl(engine: &SearchEngine, store: &IndexStore, paths: &IndexPaths) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nEnter your query: ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let query = line?;
        let query = query.trim();
        if query.is_empty() || query == "exit" {
            break;
        }
        answer(engine, store, paths, query)?;
    }
    Ok(())
}
