//! Interactive search loop

use super::{CollectionInfo, SearchClient, SearchHit, SearchRequest};
use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

pub const DEFAULT_LIMIT: usize = 5;

/// Lines of a code chunk shown per hit
const EXCERPT_LINES: usize = 12;

/// Choices made before the query loop starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub collection: String,
    pub limit: usize,
    pub file_path: Option<String>,
}

/// Run the interactive client until `quit`, `exit` or end of input
///
/// A failing query is reported and the loop carries on with the next one.
pub async fn run_session<R, W>(client: &SearchClient, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    let collections = client.list_collections().await?;
    if collections.is_empty() {
        writeln!(out, "No collections found. Index a codebase first.")?;
        return Ok(());
    }

    writeln!(out, "Available collections:")?;
    for (i, collection) in collections.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, describe_collection(collection))?;
    }

    let Some(session) = configure_session(&collections, &mut lines, out).await? else {
        return Ok(());
    };

    tracing::info!(
        collection = %session.collection,
        limit = session.limit,
        file_path = ?session.file_path,
        "Search session started"
    );
    writeln!(
        out,
        "Searching '{}' (limit {}). Type 'quit' or 'exit' to leave.",
        session.collection, session.limit
    )?;

    loop {
        let Some(line) = prompt(&mut lines, out, "query> ").await? else {
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case("quit") || query.eq_ignore_ascii_case("exit") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        match run_query(client, &session, query).await {
            Ok(hits) if hits.is_empty() => writeln!(out, "No results.")?,
            Ok(hits) => {
                for (i, hit) in hits.iter().enumerate() {
                    write!(out, "{}", render_hit(i + 1, hit))?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query failed");
                writeln!(out, "Error: {}", e)?;
            }
        }
    }

    writeln!(out, "Bye.")?;
    Ok(())
}

async fn run_query(
    client: &SearchClient,
    session: &SearchSession,
    query: &str,
) -> Result<Vec<SearchHit>, super::SearchError> {
    let vector = client.embed(query).await?;
    client
        .search(&SearchRequest {
            collection: &session.collection,
            vector: &vector,
            limit: session.limit,
            file_path: session.file_path.as_deref(),
        })
        .await
}

/// Ask for collection, limit and filter; `None` if input ends first
async fn configure_session<R, W>(
    collections: &[CollectionInfo],
    lines: &mut Lines<R>,
    out: &mut W,
) -> Result<Option<SearchSession>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let collection = loop {
        let label = format!("Collection [1-{}]: ", collections.len());
        let Some(answer) = prompt(lines, out, &label).await? else {
            return Ok(None);
        };
        match select_collection(collections, answer.trim()) {
            Some(name) => break name.to_string(),
            None => writeln!(out, "Unknown collection '{}'", answer.trim())?,
        }
    };

    let limit = loop {
        let label = format!("Result limit [{}]: ", DEFAULT_LIMIT);
        let Some(answer) = prompt(lines, out, &label).await? else {
            return Ok(None);
        };
        match parse_limit(answer.trim()) {
            Some(limit) => break limit,
            None => writeln!(out, "Limit must be a positive number")?,
        }
    };

    let Some(filter) = prompt(lines, out, "File path filter (blank for none): ").await? else {
        return Ok(None);
    };
    let filter = filter.trim();

    Ok(Some(SearchSession {
        collection,
        limit,
        file_path: (!filter.is_empty()).then(|| filter.to_string()),
    }))
}

async fn prompt<R, W>(lines: &mut Lines<R>, out: &mut W, label: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", label)?;
    out.flush()?;
    Ok(lines.next_line().await?)
}

/// Accept a 1-based index or an exact collection name
pub fn select_collection<'a>(collections: &'a [CollectionInfo], answer: &str) -> Option<&'a str> {
    if let Ok(index) = answer.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| collections.get(i))
            .map(|c| c.name.as_str());
    }
    collections
        .iter()
        .find(|c| c.name == answer)
        .map(|c| c.name.as_str())
}

/// Blank means the default; otherwise a positive integer
pub fn parse_limit(answer: &str) -> Option<usize> {
    if answer.is_empty() {
        return Some(DEFAULT_LIMIT);
    }
    answer.parse::<usize>().ok().filter(|&n| n > 0)
}

fn describe_collection(collection: &CollectionInfo) -> String {
    match collection.points_count {
        Some(count) => format!("{} ({} points)", collection.name, count),
        None => format!("{} (points unknown)", collection.name),
    }
}

/// Render one hit: rank, score, location, then an indented excerpt
pub fn render_hit(rank: usize, hit: &SearchHit) -> String {
    let payload = &hit.payload;
    let location = match (payload.start_line, payload.end_line) {
        (Some(start), Some(end)) => format!(":{}-{}", start, end),
        (Some(start), None) => format!(":{}", start),
        _ => String::new(),
    };

    let mut rendered = format!(
        "[{}] score {:.4}  {}{}\n",
        rank,
        hit.score,
        payload.file_path.as_deref().unwrap_or("<unknown file>"),
        location
    );

    if let Some(code) = &payload.code_chunk {
        let total = code.lines().count();
        for line in code.lines().take(EXCERPT_LINES) {
            rendered.push_str("    ");
            rendered.push_str(line);
            rendered.push('\n');
        }
        if total > EXCERPT_LINES {
            rendered.push_str(&format!("    ... ({} more lines)\n", total - EXCERPT_LINES));
        }
    }
    rendered.push('\n');
    rendered
}
