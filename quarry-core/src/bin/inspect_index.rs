//! Dev tool: index a directory and poke the engine from the command line.
//!
//! Usage: inspect_index <path> [query]

use std::path::PathBuf;
use std::sync::Arc;

use quarry_core::{
    Config, HashEmbedder, QuarryEngine, QuarryError, RerankerKind, RetrievalOptions,
};

#[tokio::main]
async fn main() -> quarry_core::Result<()> {
    quarry_core::init_tracing();

    let mut args = std::env::args().skip(1);
    let root = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| QuarryError::InvalidInput("usage: inspect_index <path> [query]".into()))?;
    let query = args.next();

    let engine = QuarryEngine::new(Config::default(), Arc::new(HashEmbedder::default()));

    println!("Indexing {}...", root.display());
    let stats = engine.index_directory(&root).await?;
    println!(
        "Indexed {} files into {} chunks ({} edges, {:.2} avg imports/file)",
        stats.files, stats.chunks, stats.total_edges, stats.avg_imports_per_file
    );

    let listing = engine.list_files(None).await?;
    println!("\nFiles:\n{}", listing.tree);

    if let Some(query) = query {
        let options = RetrievalOptions {
            min_score: -1.0,
            reranker: RerankerKind::None,
            ..RetrievalOptions::default()
        };
        let result = engine.search(&query, &options).await?;
        println!("Top chunks for {query:?} (stage: {:?}):", result.stage);
        for (chunk, score) in result.chunks.iter().zip(&result.scores) {
            println!(
                "  {:.3}  {}:{}-{}  {} ({})",
                score,
                chunk.filepath,
                chunk.start_line,
                chunk.end_line,
                chunk.name,
                chunk.node_type.as_str()
            );
        }
    }

    Ok(())
}
