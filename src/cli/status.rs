use anyhow::Result;

use cairn::config::CairnConfig;

/// Display search health in the terminal.
pub async fn status(config: &CairnConfig, project: Option<&str>) -> Result<()> {
    let engines = crate::server::setup_engines(config)?;
    let engine = engines.get(project)?;

    let observations = {
        let db = engines.db();
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        cairn::memory::store::count_observations(&conn, Some(engine.search.project()))?
    };
    let status = engine.search.status().await;
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!("Search Status");
    println!("{}", "=".repeat(40));
    println!("  Project:             {}", engine.search.project());
    println!("  Mode:                {}", status.mode);
    println!("  Observations:        {observations}");
    println!("  Keyword index:       {}", yes_no(status.fts_available));
    println!();

    match (&status.embedding_provider, &status.vector_store) {
        (Some(provider), Some(store)) => {
            println!("Vector Search:");
            println!("  Embedding provider:  {provider} (available: {})", yes_no(status.embedding_available));
            println!("  Vector store:        {store} (available: {})", yes_no(status.vector_store_available));
            println!("  Collection:          {}", status.collection);
            if let Some(count) = status.document_count {
                println!("  Indexed documents:   {count}");
            }
            if let Some(dimension) = status.dimension {
                println!("  Dimension:           {dimension}");
            }
        }
        _ => println!("Vector search not configured (embedding.provider = \"none\")."),
    }

    Ok(())
}
