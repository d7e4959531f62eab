use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use cairn::config::CairnConfig;
use cairn::search::hybrid::UPSERT_BATCH_SIZE;

/// Observations embedded per `index_batch` call.
const EMBED_BATCH: usize = UPSERT_BATCH_SIZE * 5;

/// Re-embed every observation of a project into its vector collection.
pub async fn reindex(config: &CairnConfig, project: Option<&str>) -> Result<()> {
    let engines = crate::server::setup_engines(config)?;
    let engine = engines.get(project)?;
    let project = engine.search.project().to_string();

    let reset = engine
        .search
        .rebuild()
        .await
        .context("vector search initialization failed")?;
    if reset {
        println!(
            "Embedding dimension changed; collection {} was cleared.",
            engine.search.collection()
        );
    }
    if engine.search.mode() != cairn::search::hybrid::SearchMode::Hybrid {
        anyhow::bail!("vector search is not configured; set embedding.provider to reindex");
    }

    let observations = {
        let db = engines.db();
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        cairn::memory::store::list_observations(&conn, Some(&project), usize::MAX >> 1)?
    };

    if observations.is_empty() {
        println!("No observations in project {project}.");
        return Ok(());
    }

    let pb = ProgressBar::new(observations.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("  {bar:40.cyan/blue} {pos}/{len} ({eta})") {
        pb.set_style(style.progress_chars("##-"));
    }

    let mut stored = 0;
    for batch in observations.chunks(EMBED_BATCH) {
        stored += engine.search.index_batch(batch).await;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    if let Some(name) = engines.embedder_name() {
        let db = engines.db();
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        cairn::db::migrations::set_embedding_model(&conn, name)?;
    }

    println!(
        "Reindexed {stored}/{} observation(s) into {}",
        observations.len(),
        engine.search.collection()
    );
    if stored < observations.len() {
        println!("Some observations failed to index; see the log for details.");
    }
    Ok(())
}
