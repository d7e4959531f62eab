use anyhow::{Context, Result};

use cairn::config::CairnConfig;
use cairn::search::hybrid::SearchOptions;

/// Run a search from the terminal.
pub async fn search(
    config: &CairnConfig,
    query: &str,
    observation_type: Option<String>,
    limit: Option<usize>,
    project: Option<&str>,
) -> Result<()> {
    let engines = crate::server::setup_engines(config)?;
    let engine = engines.get(project)?;

    let limit = limit.unwrap_or(config.search.default_limit).max(1);
    let options = SearchOptions {
        observation_type,
        ..Default::default()
    };
    let outcome = engine
        .search
        .search(query, limit, &options)
        .await
        .context("search failed")?;

    if outcome.results.is_empty() {
        println!("No results found ({} mode).", outcome.mode);
        return Ok(());
    }

    println!("Found {} result(s) ({} mode)\n", outcome.results.len(), outcome.mode);

    for (i, result) in outcome.results.iter().enumerate() {
        println!(
            "  {}. [{}] #{} {} (score: {:.4}, fts: {:.3}, vector: {:.3})",
            i + 1,
            result.record_type,
            result.record_id,
            result.title,
            result.hybrid_score,
            result.fts_score,
            result.vector_score,
        );
        if !result.snippet.is_empty() {
            println!("     {}", result.snippet.replace('\n', " "));
        }
        println!();
    }

    Ok(())
}
