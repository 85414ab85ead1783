use std::env;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use recall_core::config::{expand_path, Config};
use recall_core::types::{Meta, MetaValue};
use recall_embed::get_default_embedder;
use recall_hybrid::{Backoff, HybridIndex, Scheduler};

const USAGE: &str = "Usage: recall [--verbose] <ingest <dir> | watch <dir> [--every SECS] | search <query> [--limit N] | get <id> | list <type> [--limit N] | clear>";

struct Args {
    cmd: String,
    positional: Vec<String>,
    limit: Option<usize>,
    every: Option<u64>,
    verbose: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let mut positional = Vec::new();
    let (mut limit, mut every, mut verbose) = (None, None, false);
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--verbose" | "-v" => verbose = true,
            "--limit" | "-n" => {
                let value = raw.get(i + 1).context("--limit requires a number")?;
                limit = Some(value.parse().with_context(|| format!("invalid --limit {value:?}"))?);
                i += 1;
            }
            "--every" => {
                let value = raw.get(i + 1).context("--every requires a number of seconds")?;
                every = Some(value.parse().with_context(|| format!("invalid --every {value:?}"))?);
                i += 1;
            }
            _ => positional.push(raw[i].clone()),
        }
        i += 1;
    }
    if positional.is_empty() {
        anyhow::bail!("{USAGE}");
    }
    let cmd = positional.remove(0);
    Ok(Args { cmd, positional, limit, every, verbose })
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "recall=debug,recall_hybrid=debug" } else { "recall=info,recall_hybrid=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

fn first_arg<'a>(args: &'a Args, what: &str) -> anyhow::Result<&'a str> {
    args.positional
        .first()
        .map(String::as_str)
        .with_context(|| format!("missing {what}\n{USAGE}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_logging(args.verbose);

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.index_settings()?;
    let embedder = get_default_embedder(&settings)?;
    let index = HybridIndex::open(&settings, embedder)?;

    match args.cmd.as_str() {
        "ingest" => {
            let dir = expand_path(first_arg(&args, "directory")?);
            println!("Ingesting from {}", dir.display());
            let count = ingest(&index, &dir, true).await?;
            println!("✅ Indexed {count} files ({} entries total)", index.len());
        }
        "watch" => {
            let dir = expand_path(first_arg(&args, "directory")?);
            let every = Duration::from_secs(args.every.unwrap_or(60).max(1));
            return watch(index, dir, every).await;
        }
        "search" => {
            let query = args.positional.join(" ");
            if query.trim().is_empty() {
                anyhow::bail!("missing query\n{USAGE}");
            }
            let results = index.search(&query, args.limit.unwrap_or(10)).await;
            if results.is_empty() {
                println!("No results for {query:?}");
            }
            for (rank, entry) in results.iter().enumerate() {
                println!("{:>2}. [{}] {} ({})", rank + 1, entry.kind, entry.title, entry.id);
            }
        }
        "get" => {
            let id = first_arg(&args, "id")?;
            match index.get_by_id(id) {
                Some(entry) => println!("{}", serde_json::to_string_pretty(entry.as_ref())?),
                None => println!("No entry with id {id:?}"),
            }
        }
        "list" => {
            let kind = first_arg(&args, "type")?;
            for entry in index.get_by_type(kind, args.limit.unwrap_or(0)) {
                println!("{}  {}  {}", entry.indexed_at.format("%Y-%m-%d %H:%M:%S"), entry.id, entry.title);
            }
        }
        "clear" => {
            let before = index.len();
            index.clear_index();
            println!("Cleared {before} entries");
        }
        other => anyhow::bail!("Unknown command: {other}\n{USAGE}"),
    }

    index.shutdown().await?;
    Ok(())
}

/// Index every `.txt` file under `root`; returns how many were read.
async fn ingest(index: &HybridIndex, root: &Path, show_progress: bool) -> anyhow::Result<usize> {
    let files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
        .map(walkdir::DirEntry::into_path)
        .collect();

    let pb = if show_progress { ProgressBar::new(files.len() as u64) } else { ProgressBar::hidden() };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );

    let mut count = 0;
    for path in &files {
        pb.inc(1);
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let rel = path.strip_prefix(root).unwrap_or(path);
        let id = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
        let kind = match rel.components().next() {
            Some(Component::Normal(dir)) if rel.components().count() > 1 => dir.to_string_lossy().into_owned(),
            _ => "file".to_string(),
        };
        let title = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| id.clone());

        let mut metadata = Meta::new();
        metadata.insert("path".into(), MetaValue::from(path.display().to_string()));
        metadata.insert("bytes".into(), MetaValue::from(i64::try_from(content.len()).unwrap_or(i64::MAX)));

        pb.set_message(title.clone());
        index.index(&id, &kind, &title, &content, metadata).await;
        count += 1;
    }
    pb.finish_with_message("done");

    index.flush_index().await?;
    Ok(count)
}

async fn watch(index: HybridIndex, dir: PathBuf, every: Duration) -> anyhow::Result<()> {
    let index = Arc::new(index);
    let mut scheduler = Scheduler::new();
    let job_index = Arc::clone(&index);
    scheduler.spawn_periodic("ingest", every, Backoff::default(), move || {
        let index = Arc::clone(&job_index);
        let dir = dir.clone();
        async move {
            let count = ingest(&index, &dir, false).await?;
            tracing::info!(files = count, entries = index.len(), "ingest pass complete");
            Ok(())
        }
    });
    println!("Watching every {}s, press Ctrl-C to stop", every.as_secs());

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    scheduler.shutdown().await;

    match Arc::try_unwrap(index) {
        Ok(index) => index.shutdown().await?,
        Err(index) => index.flush_index().await?,
    }
    Ok(())
}
