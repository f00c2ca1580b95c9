//! `semse search`: ranked retrieval from the command line.

use anyhow::{Context, Result};
use std::sync::Arc;

use semse_core::models::SearchHit;
use semse_core::search::Retriever;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;

pub async fn run_search(
    config: &Config,
    query: &str,
    count: Option<usize>,
    start: usize,
    json: bool,
) -> Result<()> {
    let count = count.unwrap_or(config.server.default_count);
    let embedder = create_embedder(&config.embedding)?;

    let store = Arc::new(db::open_store(config).await?);
    let index = db::document_index(config, store.clone());
    let retriever = Retriever::new(index, embedder);

    let result = retriever.search(query, count, start).await;
    store.close().await;
    let hits = result.context("Search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        print!("{}", render_hits(&hits, start));
    }
    Ok(())
}

/// One block per hit, numbered from `start + 1`.
pub fn render_hits(hits: &[SearchHit], start: usize) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{:.4}] {} ({})\n    id: {}\n    {}\n\n",
            start + i + 1,
            hit.score,
            hit.title,
            hit.date.format("%Y-%m-%d"),
            hit.id,
            snippet(&hit.body, 160),
        ));
    }
    out
}

fn snippet(body: &str, max_chars: usize) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            title: format!("Title {}", id),
            body: "line one\n\nline   two".to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            score,
            image: None,
            kind: None,
        }
    }

    #[test]
    fn test_render_numbers_from_start() {
        let out = render_hits(&[hit("a", 0.1), hit("b", 0.25)], 2);
        assert!(out.starts_with("3. [0.1000] Title a (2024-05-01)"));
        assert!(out.contains("4. [0.2500] Title b"));
        assert!(out.contains("    line one line two\n"));
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let body = "é".repeat(200);
        let s = snippet(&body, 10);
        assert_eq!(s, format!("{}...", "é".repeat(10)));
        assert_eq!(snippet("short", 10), "short");
    }
}
