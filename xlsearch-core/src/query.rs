//! Search requests and their execution against the FTS5 index

use crate::config::Config;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

/// Shortest term the trigram index can answer; shorter terms fall back to LIKE.
const MIN_INDEXED_TERM_CHARS: usize = 3;
/// Characters kept ahead of the first match when a snippet window is cut.
const SNIPPET_LEAD_CHARS: usize = 25;

pub const HIGHLIGHT_OPEN: &str = "<b>";
pub const HIGHLIGHT_CLOSE: &str = "</b>";

/// A search over indexed rows.
///
/// Every non-blank term in `query` and `terms` must occur in a row as a
/// literal, case-insensitive substring (AND). Rows from files whose path
/// contains any `exclude` substring are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Add a required term
    pub fn and(mut self, term: impl Into<String>) -> Self {
        self.terms.push(term.into());
        self
    }

    /// Drop rows whose file path contains `fragment`
    pub fn excluding(mut self, fragment: impl Into<String>) -> Self {
        self.exclude.push(fragment.into());
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Trimmed, non-blank terms: the primary query followed by the extras
    pub fn required_terms(&self) -> Vec<&str> {
        std::iter::once(self.query.as_str())
            .chain(self.terms.iter().map(String::as_str))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn exclusions(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(String::as_str).filter(|e| !e.is_empty())
    }
}

/// One matching row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    pub sheet: String,
    /// One-based row number
    pub row: usize,
    pub snippet: String,
}

/// A page of hits plus the total number of matching rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            count: 0,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Build an FTS5 expression requiring every indexable term, each as a quoted phrase.
///
/// Returns `None` when every term is too short for the trigram index.
pub fn fts_match_expression(terms: &[&str]) -> Option<String> {
    let phrases: Vec<String> = terms
        .iter()
        .filter(|t| is_indexable(t))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if phrases.is_empty() {
        None
    } else {
        Some(phrases.join(" AND "))
    }
}

fn is_indexable(term: &str) -> bool {
    term.chars().count() >= MIN_INDEXED_TERM_CHARS
}

/// `%term%` with LIKE wildcards in `term` escaped by `\`
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Run `request` on `conn`.
///
/// Hits and count are read inside one transaction so they describe the same
/// committed state.
pub fn execute_search(
    conn: &Connection,
    request: &SearchRequest,
    config: &Config,
) -> crate::Result<SearchResponse> {
    let limit = config.page_limit(request.limit);
    let snippet_chars = config.fts.snippet_chars.max(1);
    let terms = request.required_terms();

    let tx = conn.unchecked_transaction()?;

    let response = if terms.is_empty() {
        list_rows(&tx, request, limit, snippet_chars)?
    } else {
        match_rows(&tx, request, &terms, limit, snippet_chars)?
    };

    tx.commit()?;
    Ok(response)
}

fn exclusion_clause(request: &SearchRequest, params: &mut Vec<Value>) -> String {
    let mut clause = String::new();
    for fragment in request.exclusions() {
        clause.push_str(" AND instr(f.path, ?) = 0");
        params.push(Value::Text(fragment.to_string()));
    }
    clause
}

/// Every row in insertion order
fn list_rows(
    conn: &Connection,
    request: &SearchRequest,
    limit: usize,
    snippet_chars: usize,
) -> crate::Result<SearchResponse> {
    let mut filter_params = Vec::new();
    let exclusions = exclusion_clause(request, &mut filter_params);

    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*)
             FROM entries e
             JOIN files f ON f.id = e.file_id
             WHERE 1 = 1{exclusions}"
        ),
        params_from_iter(filter_params.iter()),
        |row| row.get(0),
    )?;

    let mut page_params = filter_params;
    page_params.push(Value::Integer(limit as i64));
    page_params.push(Value::Integer(request.offset as i64));

    let mut stmt = conn.prepare(&format!(
        "SELECT f.path, e.sheet_name, e.row_index, substr(e.content, 1, {snippet_chars})
         FROM entries e
         JOIN files f ON f.id = e.file_id
         WHERE 1 = 1{exclusions}
         ORDER BY e.id
         LIMIT ? OFFSET ?"
    ))?;
    let results = stmt
        .query_map(params_from_iter(page_params.iter()), hit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchResponse {
        results,
        count: count as usize,
        error: None,
    })
}

/// Rows containing every term.
///
/// Terms of three or more characters go through the trigram index and rank
/// the hits by bm25; shorter ones are checked with LIKE. Without any indexed
/// term the hits come back in insertion order.
fn match_rows(
    conn: &Connection,
    request: &SearchRequest,
    terms: &[&str],
    limit: usize,
    snippet_chars: usize,
) -> crate::Result<SearchResponse> {
    let mut filter_params = Vec::new();
    let mut predicates = String::new();

    let (source, order) = match fts_match_expression(terms) {
        Some(expression) => {
            predicates.push_str(" AND entries_fts MATCH ?");
            filter_params.push(Value::Text(expression));
            (
                "entries_fts JOIN entries e ON e.id = entries_fts.rowid",
                "bm25(entries_fts), e.id",
            )
        }
        None => ("entries e", "e.id"),
    };

    for term in terms.iter().filter(|t| !is_indexable(t)) {
        predicates.push_str(" AND e.content LIKE ? ESCAPE '\\'");
        filter_params.push(Value::Text(like_pattern(term)));
    }
    predicates.push_str(&exclusion_clause(request, &mut filter_params));

    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*)
             FROM {source}
             JOIN files f ON f.id = e.file_id
             WHERE 1 = 1{predicates}"
        ),
        params_from_iter(filter_params.iter()),
        |row| row.get(0),
    )?;

    let mut page_params = filter_params;
    page_params.push(Value::Integer(limit as i64));
    page_params.push(Value::Integer(request.offset as i64));

    let mut stmt = conn.prepare(&format!(
        "SELECT f.path, e.sheet_name, e.row_index, e.content
         FROM {source}
         JOIN files f ON f.id = e.file_id
         WHERE 1 = 1{predicates}
         ORDER BY {order}
         LIMIT ? OFFSET ?"
    ))?;
    let results = stmt
        .query_map(params_from_iter(page_params.iter()), hit_from_row)?
        .map(|hit| {
            hit.map(|mut hit| {
                hit.snippet = render_snippet(&hit.snippet, terms, snippet_chars);
                hit
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchResponse {
        results,
        count: count as usize,
        error: None,
    })
}

fn hit_from_row(row: &rusqlite::Row) -> rusqlite::Result<SearchHit> {
    let row_index: i64 = row.get(2)?;
    Ok(SearchHit {
        file: row.get(0)?,
        sheet: row.get(1)?,
        row: row_index as usize + 1,
        snippet: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

/// Cut `width` characters of `content` starting a little before the first
/// match, and wrap every occurrence of a term inside that window in
/// highlight tags. Matching is ASCII case-insensitive.
fn render_snippet(content: &str, terms: &[&str], width: usize) -> String {
    let needles: Vec<String> = terms.iter().map(|t| t.to_ascii_lowercase()).collect();

    let folded = content.to_ascii_lowercase();
    let first = needles
        .iter()
        .filter_map(|n| folded.find(n.as_str()))
        .min()
        .unwrap_or(0);
    let start = content[..first]
        .chars()
        .count()
        .saturating_sub(SNIPPET_LEAD_CHARS);
    let window: String = content.chars().skip(start).take(width).collect();

    let folded = window.to_ascii_lowercase();
    let mut spans: Vec<(usize, usize)> = needles
        .iter()
        .flat_map(|n| {
            folded
                .match_indices(n.as_str())
                .map(|(at, m)| (at, at + m.len()))
        })
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (from, to) in spans {
        match merged.last_mut() {
            Some(last) if from <= last.1 => last.1 = last.1.max(to),
            _ => merged.push((from, to)),
        }
    }

    let mut snippet = String::with_capacity(window.len() + merged.len() * 7);
    let mut cursor = 0;
    for (from, to) in merged {
        snippet.push_str(&window[cursor..from]);
        snippet.push_str(HIGHLIGHT_OPEN);
        snippet.push_str(&window[from..to]);
        snippet.push_str(HIGHLIGHT_CLOSE);
        cursor = to;
    }
    snippet.push_str(&window[cursor..]);
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FtsConfig;
    use crate::index::IndexStore;
    use crate::reader::{RowEntry, SheetRows};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: IndexStore,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = Config::for_paths(dir.path(), dir.path().join("index.db"));
            let store = IndexStore::open(&config.core.db_path, &FtsConfig::default()).unwrap();
            Self {
                _dir: dir,
                store,
                config,
            }
        }

        fn add(&mut self, path: &str, sheet: &str, rows: &[&str]) {
            let sheets = [SheetRows {
                sheet_name: sheet.to_string(),
                rows: rows
                    .iter()
                    .enumerate()
                    .map(|(row_index, content)| RowEntry {
                        row_index,
                        content: content.to_string(),
                    })
                    .collect(),
            }];
            self.store.commit_file(path, 1, &sheets).unwrap();
        }

        fn search(&self, request: &SearchRequest) -> SearchResponse {
            let conn = IndexStore::open_reader(&self.config.core.db_path).unwrap();
            execute_search(&conn, request, &self.config).unwrap()
        }
    }

    #[test]
    fn test_fts_match_expression() {
        assert_eq!(
            fts_match_expression(&["apple", "banana"]).as_deref(),
            Some("\"apple\" AND \"banana\"")
        );
        assert_eq!(
            fts_match_expression(&["say \"hi\""]).as_deref(),
            Some("\"say \"\"hi\"\"\"")
        );
        assert_eq!(
            fts_match_expression(&["apple", "m4"]).as_deref(),
            Some("\"apple\"")
        );
        assert_eq!(fts_match_expression(&["m4", "--"]), None);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("m4"), "%m4%");
        assert_eq!(like_pattern("5%"), "%5\\%%");
        assert_eq!(like_pattern("a_"), "%a\\_%");
    }

    #[test]
    fn test_render_snippet_windows_around_first_match() {
        let content = format!("{}needle{}", "x".repeat(50), "y".repeat(100));
        let snippet = render_snippet(&content, &["needle"], 100);
        assert_eq!(
            snippet,
            format!("{}<b>needle</b>{}", "x".repeat(25), "y".repeat(69))
        );
    }

    #[test]
    fn test_render_snippet_merges_overlapping_terms() {
        assert_eq!(
            render_snippet("Apple pie", &["app", "apple"], 100),
            "<b>Apple</b> pie"
        );
        assert_eq!(render_snippet("红苹果 10", &["苹果"], 100), "红<b>苹果</b> 10");
    }

    #[test]
    fn test_required_terms_skip_blanks() {
        let request = SearchRequest::new("  ").and("apple").and("").and(" pie ");
        assert_eq!(request.required_terms(), vec!["apple", "pie"]);
    }

    #[test]
    fn test_empty_index_lists_nothing() {
        let fx = Fixture::new();
        let response = fx.search(&SearchRequest::default());
        assert_eq!(response, SearchResponse::default());
    }

    #[test]
    fn test_listing_rows_are_one_based() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "Jan", &["first row", "second row"]);

        let response = fx.search(&SearchRequest::default());
        assert_eq!(response.count, 2);
        assert_eq!(response.results[0].row, 1);
        assert_eq!(response.results[0].snippet, "first row");
        assert_eq!(response.results[1].row, 2);
    }

    #[test]
    fn test_listing_snippet_is_truncated() {
        let mut fx = Fixture::new();
        let long = "x".repeat(250);
        fx.add("/d/a.xlsx", "S", &[long.as_str()]);

        let response = fx.search(&SearchRequest::default());
        assert_eq!(response.results[0].snippet.chars().count(), 100);
    }

    #[test]
    fn test_conjunction() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["apple", "apple banana", "banana"]);

        let response = fx.search(&SearchRequest::new("apple").and("banana"));
        assert_eq!(response.count, 1);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].row, 2);
    }

    #[test]
    fn test_exclusion_applies_to_results_and_count() {
        let mut fx = Fixture::new();
        fx.add("/d/a/inventory.xlsx", "S", &["bolt m4"]);
        fx.add("/d/b/inventory_old.xlsx", "S", &["bolt m5"]);

        let all = fx.search(&SearchRequest::new("bolt"));
        assert_eq!(all.count, 2);

        let response = fx.search(&SearchRequest::new("bolt").excluding("_old"));
        assert_eq!(response.count, 1);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].file, "/d/a/inventory.xlsx");

        let listing = fx.search(&SearchRequest::default().excluding("_old").excluding(""));
        assert_eq!(listing.count, 1);
    }

    #[test]
    fn test_snippet_highlights_every_term() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["red apple and yellow banana"]);

        let response = fx.search(&SearchRequest::new("apple").and("banana"));
        assert_eq!(
            response.results[0].snippet,
            "red <b>apple</b> and yellow <b>banana</b>"
        );
    }

    #[test]
    fn test_substring_inside_words_and_cjk_runs() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["bolt-M4x10 红苹果", "nut-M5"]);

        for term in ["M4", "m4", "olt-m", "苹果", "红苹果", "x10"] {
            let response = fx.search(&SearchRequest::new(term));
            assert_eq!(response.count, 1, "term {term:?}");
            assert_eq!(response.results[0].row, 1);
        }
        assert_eq!(fx.search(&SearchRequest::new("青苹果")).count, 0);
        assert_eq!(fx.search(&SearchRequest::new("-M")).count, 2);
    }

    #[test]
    fn test_short_and_indexed_terms_combine() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["bolt m4", "bolt m5", "m4 washer"]);

        let response = fx.search(&SearchRequest::new("bolt").and("m4"));
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].snippet, "<b>bolt</b> <b>m4</b>");
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["100% cotton", "1000 units", "a_b", "axb"]);

        assert_eq!(fx.search(&SearchRequest::new("0%")).count, 1);
        assert_eq!(fx.search(&SearchRequest::new("_")).count, 1);
    }

    #[test]
    fn test_zero_limit_returns_count_only() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["widget 1", "widget 2"]);

        let response = fx.search(&SearchRequest::new("widget").page(0, 0));
        assert_eq!(response.count, 2);
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_pagination_sums_to_count() {
        let mut fx = Fixture::new();
        let rows: Vec<String> = (0..23).map(|i| format!("widget {i}")).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        fx.add("/d/a.xlsx", "S", &rows);

        let first = fx.search(&SearchRequest::new("widget").page(5, 0));
        assert_eq!(first.count, 23);

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = fx.search(&SearchRequest::new("widget").page(5, offset));
            if page.results.is_empty() {
                break;
            }
            assert_eq!(page.count, 23);
            seen.extend(page.results.into_iter().map(|h| h.row));
            offset += 5;
        }
        assert_eq!(seen.len(), first.count);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn test_punctuation_term_matches_literally() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["a - b", "a b"]);

        let response = fx.search(&SearchRequest::new("-"));
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].snippet, "a <b>-</b> b");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_fts_syntax_in_terms_is_literal() {
        let mut fx = Fixture::new();
        fx.add("/d/a.xlsx", "S", &["part NEAR bin", "plain"]);

        let response = fx.search(&SearchRequest::new("NEAR(part bin)"));
        assert_eq!(response.count, 0);

        let response = fx.search(&SearchRequest::new("part OR plain"));
        assert_eq!(response.count, 0);
    }

    #[test]
    fn test_response_serialization_omits_missing_error() {
        let json = serde_json::to_value(SearchResponse::default()).unwrap();
        assert_eq!(json, serde_json::json!({"results": [], "count": 0}));

        let json = serde_json::to_value(SearchResponse::failed("internal error")).unwrap();
        assert_eq!(json["error"], "internal error");
    }
}
