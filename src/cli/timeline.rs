use anyhow::{Context, Result};
use chrono::DateTime;

use cairn::config::CairnConfig;
use cairn::search::hybrid::TimelineAnchor;
use cairn::search::keyword::TimelineItem;

/// Print the observations around an anchor id or the best match for a query.
pub async fn timeline(
    config: &CairnConfig,
    anchor: TimelineAnchor,
    depth: Option<usize>,
    project: Option<&str>,
) -> Result<()> {
    let engines = crate::server::setup_engines(config)?;
    let engine = engines.get(project)?;
    let depth = depth.unwrap_or(config.search.timeline_depth);

    let result = engine
        .search
        .timeline(anchor, depth, depth)
        .await
        .context("timeline failed")?;

    let Some(anchor) = result.anchor.as_ref().filter(|_| result.found) else {
        println!("No matching observation.");
        return Ok(());
    };

    for item in &result.before {
        print_item(item, "  ");
    }
    print_item(anchor, "> ");
    for item in &result.after {
        print_item(item, "  ");
    }
    Ok(())
}

fn print_item(item: &TimelineItem, marker: &str) {
    let when = DateTime::from_timestamp_millis(item.created_at_epoch)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("{marker}{when}  #{:<6} [{}] {}", item.id, item.record_type, item.title);
}
