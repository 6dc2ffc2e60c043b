use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use cookbuddy_core::models::{Comment, Post, RecipeSummary, ResolvedRecipe};

/// Read one line from stdin after printing `label` to stderr.
pub(crate) fn prompt_line(label: &str) -> Result<String> {
    eprint!("{label}: ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask for a 1-based pick out of `count` rows; returns the 0-based index.
pub(crate) fn prompt_choice(what: &str, count: usize) -> Result<usize> {
    eprint!("\nSelect a {what} (1-{count}): ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    parse_choice(&line, count)
}

fn parse_choice(input: &str, count: usize) -> Result<usize> {
    let n: usize = input.trim().parse().context("Invalid number")?;
    if n < 1 || n > count {
        bail!("Selection out of range");
    }
    Ok(n - 1)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_summary_table(recipes: &[RecipeSummary]) {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Category")]
        category: String,
    }

    let rows: Vec<SummaryRow> = recipes
        .iter()
        .enumerate()
        .map(|(i, r)| SummaryRow {
            idx: i + 1,
            id: r.id.clone(),
            title: truncate(&r.title, 45),
            category: r.category.clone().unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(&rows).with(Style::rounded()));
}

pub(crate) fn print_saved_table(recipes: &[ResolvedRecipe]) {
    #[derive(Tabled)]
    struct SavedRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Category")]
        category: String,
    }

    let rows: Vec<SavedRow> = recipes
        .iter()
        .enumerate()
        .map(|(i, r)| SavedRow {
            idx: i + 1,
            id: r.recipe_id.clone(),
            title: truncate(&r.title, 45),
            category: r.category.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    println!("{}", Table::new(&rows).with(Style::rounded()));
}

pub(crate) fn print_posts_table(posts: &[Post]) {
    #[derive(Tabled)]
    struct PostRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Upvotes")]
        upvotes: i64,
        #[tabled(rename = "Posted")]
        created: String,
    }

    let rows: Vec<PostRow> = posts
        .iter()
        .map(|p| PostRow {
            id: p.id,
            title: truncate(&p.title, 40),
            recipe: p.recipe_id.clone().unwrap_or_else(|| "-".to_string()),
            upvotes: p.upvotes,
            created: short_date(&p.created_at),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_comments(comments: &[Comment]) {
    if comments.is_empty() {
        println!("No comments yet");
        return;
    }
    for c in comments {
        let when = short_date(&c.created_at);
        let user = c.user_id;
        println!("  [{when}] user {user}: {}", c.content);
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// `YYYY-MM-DD` prefix of an RFC 3339 timestamp.
pub(crate) fn short_date(ts: &str) -> String {
    ts.get(..10).unwrap_or(ts).to_string()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
