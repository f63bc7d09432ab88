use std::sync::Arc;

use clap::Parser;
use docsift::{
    backend::ScoredResult,
    chunker,
    collection::CollectionManager,
    embedder::HashEmbedder,
    error::Result,
    executor::CancellationToken,
    support_dir::SupportDir,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSIFT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }
    if let Command::Chunk(args) = &cli.command {
        use std::io::Write;

        let chunks = chunker::chunk_document(&args.path, args.granularity)?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for chunk in &chunks {
            serde_json::to_writer(&mut out, chunk)?;
            out.write_all(b"\n")?;
        }
        return Ok(());
    }

    let support = SupportDir::resolve(cli.support_dir.as_deref())?;
    let manager =
        CollectionManager::new(support, Arc::new(HashEmbedder::default_384()));

    match cli.command {
        Command::Index(args) => {
            let report =
                manager.create_or_update(&args.name, args.kind, &args.files)?;
            println!(
                "Indexed {} file(s) ({} chunks) into '{}'",
                report.indexed_files.len(),
                report.chunks,
                args.name
            );
            for (file, reason) in &report.failed_files {
                eprintln!("Skipped {}: {reason}", file.display());
            }
        }
        Command::Query(args) => {
            if let Some(stream_path) = &args.stream {
                let mut out = std::fs::File::create(stream_path)?;
                manager.query_stream(
                    &args.name,
                    &args.query,
                    args.count,
                    args.lock_file.as_deref(),
                    &mut out,
                )?;
            } else {
                let results = manager.query(
                    &args.name,
                    &args.query,
                    args.count,
                    &CancellationToken::new(),
                )?;
                if args.json {
                    println!("{}", serde_json::to_string(&results)?);
                } else {
                    format_human(&results);
                }
            }
        }
        Command::Delete { name } => {
            manager.delete(&name)?;
            println!("Deleted collection '{name}'");
        }
        Command::Chunk(_) | Command::Completions(_) => unreachable!(),
    }

    Ok(())
}

fn format_human(results: &[ScoredResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for result in results {
        let bounds = match (result.lower, result.upper) {
            (Some(lo), Some(hi)) => format!(" [{lo}..{hi}]"),
            _ => String::new(),
        };
        println!(
            "{}:{}{bounds} (score: {:.3})",
            result.file.display(),
            result.page,
            result.score
        );
    }
}
