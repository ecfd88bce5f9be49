// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable,
//! plus rendering of ranked results for the text and JSON formats.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::corpus::Module;
use crate::similarity::{Score, SimilarityResult};

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize module title (bold)
pub fn colorize_title(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize module id (cyan)
pub fn colorize_id(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a score: green for cosine similarity, yellow for distance
pub fn colorize_score(score: &Score, use_color: bool) -> String {
    let text = score.to_string();
    match (use_color, score) {
        (false, _) => text,
        (true, Score::Cosine(_)) => text.green().to_string(),
        (true, Score::Distance(_)) => text.yellow().to_string(),
    }
}

/// Colorize a status line (dimmed)
pub fn colorize_status(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Print a status line to stderr so stdout stays parseable
pub fn status(text: &str) {
    eprintln!("{}", colorize_status(text, use_colors()));
}

/// Print a value as JSON, pretty unless `compact`
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

/// JSON document for a ranking run
#[derive(Debug, Serialize)]
pub struct RankingReport<'a> {
    pub target: TargetRef<'a>,
    pub results: &'a [SimilarityResult],
}

#[derive(Debug, Serialize)]
pub struct TargetRef<'a> {
    pub module_id: &'a str,
    pub title: &'a str,
}

impl<'a> RankingReport<'a> {
    pub fn new(target: &'a Module, results: &'a [SimilarityResult]) -> Self {
        Self {
            target: TargetRef {
                module_id: &target.module_id,
                title: &target.title,
            },
            results,
        }
    }
}

/// Render ranked results as text
///
/// ```text
/// Top 2 modules similar to: Parallel Programming
/// Module: (m2) Concurrency Basics, Similarity: 0.91
/// Module: (m7) GPU Computing, Similarity: 0.74
/// ```
pub fn render_results(target: &Module, results: &[SimilarityResult], use_color: bool) -> String {
    if results.is_empty() {
        return format!(
            "No modules similar to: {}\n",
            colorize_title(&target.title, use_color)
        );
    }

    let mut out = format!(
        "Top {} modules similar to: {}\n",
        results.len(),
        colorize_title(&target.title, use_color)
    );
    for result in results {
        out.push_str(&format!(
            "Module: ({}) {}, {}\n",
            colorize_id(&result.module_id, use_color),
            result.title,
            colorize_score(&result.score, use_color)
        ));
    }
    out
}
