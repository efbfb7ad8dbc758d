//! Text patterns over the SQL stored in `sqlite_master`.
//!
//! SQLite keeps no structured record of collations, generated columns,
//! primary-key sort order, index sort order, trigger clauses or CHECK
//! constraints, so these are recovered from the stored `CREATE` text.
//! Every function here fails closed: when nothing matches, the feature is
//! reported as absent.
//!
//! Identifiers quoted with `"..."`, `` `...` `` and `[...]` are recognised.
//! SQL comments and string literals are skipped when looking for
//! parentheses and commas.

use regex::{Captures, Match, Regex};
use std::sync::LazyLock;

use crate::db::grammar::unescape_id;
use crate::types::{
    DefaultValue, GeneratedColumn, GeneratedStorage, TriggerEvent, TriggerTiming,
};

/// A single identifier at the start of a definition
const IDENT: &str = r#"(?:"(?:[^"]|"")*"|`(?:[^`]|``)*`|\[[^\]]*\]|[^\s"`\[(),]+)"#;

/// Identifier as written in trigger headers, possibly schema-qualified
const TRIGGER_IDENT: &str = r#"(?:[^`"\s]+|`[^`]*`|"[^"]*")+"#;

static QUOTED_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^'((?:[^']|'')*)'$").expect("static regex must compile"));

static LEADING_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*({IDENT})")).expect("static regex must compile")
});

static COLLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bCOLLATE\s+('[^']+'|"(?:[^"]|"")+"|[^\s,()]+)"#)
        .expect("static regex must compile")
});

static GENERATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:GENERATED\s+ALWAYS\s+)?AS\s*\(").expect("static regex must compile")
});

static STORAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(STORED|VIRTUAL)\b").expect("static regex must compile"));

static PRIMARY_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\s*\(").expect("static regex must compile"));

static KEY_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*({IDENT})(?:\s+COLLATE\s+\S+)?(?:\s+(ASC|DESC))?\s*$"
    ))
    .expect("static regex must compile")
});

static INDEX_ON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?{IDENT}(?:\.{IDENT})?\s+ON\s+{IDENT}\s*\("
    ))
    .expect("static regex must compile")
});

static DESC_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDESC\s*$").expect("static regex must compile"));

static TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?TRIGGER\s+(?:IF\s+NOT\s+EXISTS\s+)?{id}\s*(BEFORE|AFTER|INSTEAD\s+OF)?\s*\b(INSERT|UPDATE|DELETE)\b(?:\s+OF\s+({id}(?:\s*,\s*{id})*))?\s+ON\s*{id}\s*(?:FOR\s+EACH\s+ROW\b\s*)?(.*)$",
        id = TRIGGER_IDENT
    ))
    .expect("static regex must compile")
});

static TRIGGER_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?TRIGGER\s+(?:IF\s+NOT\s+EXISTS\s+)?{TRIGGER_IDENT}\s*(BEFORE|AFTER|INSTEAD\s+OF)?\s*(.*?)\s+ON\b"
    ))
    .expect("static regex must compile")
});

static CHECK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCHECK\s*\(").expect("static regex must compile"));

static VIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?{IDENT}(?:\.{IDENT})?(?:\s*\([^)]*\))?\s+AS\s+(.*)$"
    ))
    .expect("static regex must compile")
});

/// Parsed header and body of a `CREATE TRIGGER` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerParts {
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    pub columns: Vec<String>,
    pub statement: String,
}

/// Interpret `dflt_value` from `PRAGMA table_info`.
///
/// A quoted literal is unescaped, the bare word `NULL` means no default,
/// anything else is kept as expression text.
pub fn parse_default(raw: Option<&str>) -> Option<DefaultValue> {
    let raw = raw?;
    if raw == "NULL" {
        return None;
    }
    if let Some(caps) = QUOTED_LITERAL_RE.captures(raw) {
        return Some(DefaultValue::Literal(caps[1].replace("''", "'")));
    }
    Some(DefaultValue::Expression(raw.to_string()))
}

/// Byte positions that are not inside a string, quoted identifier or comment
fn unquoted_positions(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut positions = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let closing = match bytes[i] {
            b'\'' => Some(b'\''),
            b'"' => Some(b'"'),
            b'`' => Some(b'`'),
            b'[' => Some(b']'),
            _ => None,
        };
        if let Some(close) = closing {
            i += 1;
            while i < bytes.len() && bytes[i] != close {
                i += 1;
            }
            i += 1;
            continue;
        }
        if bytes[i] == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i += 2;
            continue;
        }
        positions.push(i);
        i += 1;
    }
    positions
}

/// First match of `re` that starts outside literals and comments
fn find_unquoted<'t>(re: &Regex, text: &'t str) -> Option<Match<'t>> {
    let allowed = unquoted_positions(text);
    re.find_iter(text)
        .find(|m| allowed.binary_search(&m.start()).is_ok())
}

fn captures_unquoted<'t>(re: &Regex, text: &'t str) -> Option<Captures<'t>> {
    let allowed = unquoted_positions(text);
    re.captures_iter(text)
        .find(|caps| caps.get(0).is_some_and(|m| allowed.binary_search(&m.start()).is_ok()))
}

/// Contents of the parenthesised group opening at `open`
fn balanced_group(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    for pos in unquoted_positions(&text[open..]) {
        match bytes[open + pos] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..open + pos]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested in parentheses or quotes
fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for pos in unquoted_positions(text) {
        match bytes[pos] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&text[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Column and constraint definitions inside `CREATE TABLE (...)`
pub fn table_definitions(create_sql: &str) -> Vec<&str> {
    let bytes = create_sql.as_bytes();
    let open = unquoted_positions(create_sql)
        .into_iter()
        .find(|&pos| bytes[pos] == b'(');
    match open.and_then(|open| balanced_group(create_sql, open)) {
        Some(body) => split_top_level(body)
            .into_iter()
            .map(strip_leading_comments)
            .filter(|definition| !definition.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

fn strip_leading_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix("--") {
            text = rest.find('\n').map_or("", |pos| &rest[pos + 1..]);
        } else if let Some(rest) = text.strip_prefix("/*") {
            text = rest.find("*/").map_or("", |pos| &rest[pos + 2..]);
        } else {
            return text;
        }
    }
}

fn leading_identifier(definition: &str) -> Option<String> {
    LEADING_IDENT_RE
        .captures(definition)
        .map(|caps| unescape_id(&caps[1]))
}

/// `(column, collation)` for every column definition with a `COLLATE` clause
pub fn column_collations(create_sql: &str) -> Vec<(String, String)> {
    table_definitions(create_sql)
        .into_iter()
        .filter_map(|definition| {
            let name = leading_identifier(definition)?;
            let caps = captures_unquoted(&COLLATE_RE, definition)?;
            let raw = &caps[1];
            let collation = if raw.starts_with('\'') {
                raw.trim_matches('\'').to_string()
            } else {
                unescape_id(raw)
            };
            Some((name, collation))
        })
        .collect()
}

/// `(column, generated)` for every `GENERATED ALWAYS AS (...)` column.
/// A missing storage keyword means `VIRTUAL`.
pub fn generated_columns(create_sql: &str) -> Vec<(String, GeneratedColumn)> {
    table_definitions(create_sql)
        .into_iter()
        .filter_map(|definition| {
            let name = leading_identifier(definition)?;
            let found = find_unquoted(&GENERATED_RE, definition)?;
            let open = found.end() - 1;
            let expression = balanced_group(definition, open)?;
            let rest = &definition[open + expression.len() + 2..];
            let storage = match STORAGE_RE.captures(rest) {
                Some(caps) if caps[1].eq_ignore_ascii_case("stored") => GeneratedStorage::Stored,
                _ => GeneratedStorage::Virtual,
            };
            Some((
                name,
                GeneratedColumn {
                    expression: expression.trim().to_string(),
                    storage,
                },
            ))
        })
        .collect()
}

/// Columns and DESC flags of a `PRIMARY KEY (...)` clause
pub fn primary_key_columns(create_sql: &str) -> Option<Vec<(String, bool)>> {
    let found = find_unquoted(&PRIMARY_KEY_RE, create_sql)?;
    let body = balanced_group(create_sql, found.end() - 1)?;
    let mut columns = Vec::new();
    for part in split_top_level(body) {
        let caps = KEY_COLUMN_RE.captures(part)?;
        let descending = caps
            .get(2)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("desc"));
        columns.push((unescape_id(&caps[1]), descending));
    }
    if columns.is_empty() {
        None
    } else {
        Some(columns)
    }
}

/// DESC flag per column of a stored `CREATE INDEX` statement
pub fn index_descending(index_sql: &str) -> Vec<bool> {
    let Some(found) = INDEX_ON_RE.find(index_sql) else {
        return Vec::new();
    };
    let Some(body) = balanced_group(index_sql, found.end() - 1) else {
        return Vec::new();
    };
    split_top_level(body)
        .into_iter()
        .map(|part| DESC_SUFFIX_RE.is_match(part))
        .collect()
}

fn parse_event(text: &str) -> Option<(TriggerEvent, Vec<String>)> {
    let text = text.trim();
    let (word, rest) = match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim_start()),
        None => (text, ""),
    };
    match word.to_uppercase().as_str() {
        "INSERT" => Some((TriggerEvent::Insert, Vec::new())),
        "DELETE" => Some((TriggerEvent::Delete, Vec::new())),
        "UPDATE" if rest.is_empty() => Some((TriggerEvent::Update, Vec::new())),
        "UPDATE" => {
            let columns = rest
                .get(..2)
                .filter(|of| of.eq_ignore_ascii_case("of"))
                .map(|_| &rest[2..])?;
            Some((TriggerEvent::UpdateOf, split_columns(columns)))
        }
        _ => None,
    }
}

fn split_columns(list: &str) -> Vec<String> {
    split_top_level(list).into_iter().map(unescape_id).collect()
}

/// Timing, event and body of a stored `CREATE TRIGGER` statement.
/// A trigger written without timing is `BEFORE`.
pub fn trigger_definition(sql: &str) -> Option<TriggerParts> {
    let caps = TRIGGER_RE.captures(sql)?;
    let timing = match caps.get(1) {
        Some(m) => TriggerTiming::parse(m.as_str())?,
        None => TriggerTiming::Before,
    };
    let (event, columns) = match caps.get(3) {
        Some(of) if caps[2].eq_ignore_ascii_case("update") => {
            (TriggerEvent::UpdateOf, split_columns(of.as_str()))
        }
        _ => parse_event(&caps[2])?,
    };
    Some(TriggerParts {
        timing,
        event,
        columns,
        statement: caps[4].trim().to_string(),
    })
}

/// Timing and event only, for trigger listings
pub fn trigger_timing_event(sql: &str) -> Option<(TriggerTiming, TriggerEvent, Vec<String>)> {
    let caps = TRIGGER_HEADER_RE.captures(sql)?;
    let timing = match caps.get(1) {
        Some(m) => TriggerTiming::parse(m.as_str())?,
        None => TriggerTiming::Before,
    };
    let (event, columns) = parse_event(&caps[2])?;
    Some((timing, event, columns))
}

/// Bodies of every `CHECK (...)` clause
pub fn check_constraints(create_sql: &str) -> Vec<String> {
    let allowed = unquoted_positions(create_sql);
    CHECK_RE
        .find_iter(create_sql)
        .filter(|m| allowed.binary_search(&m.start()).is_ok())
        .filter_map(|m| balanced_group(create_sql, m.end() - 1))
        .map(|body| body.trim().to_string())
        .collect()
}

/// The `SELECT` part of a stored `CREATE VIEW` statement
pub fn view_select(create_sql: &str) -> String {
    match VIEW_RE.captures(create_sql) {
        Some(caps) => caps[1].trim().to_string(),
        None => create_sql.to_string(),
    }
}

/// Whether a file name carries one of the accepted database extensions
pub fn is_database_file(name: &str, extensions: &[String]) -> bool {
    if name.contains('\0') {
        return false;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && extensions.iter().any(|e| e == ext),
        None => false,
    }
}
