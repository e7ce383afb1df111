//! Translation of agent-style search queries into SQLite FTS5 expressions.
//!
//! The agent refines user requests into a small query language: whitespace
//! separated terms, `+term` for required, `-term` for prohibited and
//! `field:term` to restrict a term to one indexed field. Optional terms are
//! OR-ed, required terms AND-ed, prohibited terms excluded.

/// Columns of the template index that can be targeted with `field:term`.
pub const INDEXED_FIELDS: &[&str] = &["kind", "name", "title", "description", "tags", "creates"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Optional,
    Required,
    Prohibited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub text: String,
    pub field: Option<&'static str>,
    pub presence: Presence,
    /// Trailing `*` in the query: match any token starting with `text`.
    pub prefix: bool,
}

/// MATCH expressions for one query. `include: None` means every document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    pub include: Option<String>,
    pub exclude: Option<String>,
}

fn indexed_field(name: &str) -> Option<&'static str> {
    INDEXED_FIELDS
        .iter()
        .copied()
        .find(|f| f.eq_ignore_ascii_case(name))
}

fn parse_term(token: &str) -> Option<QueryTerm> {
    let (presence, rest) = if let Some(rest) = token.strip_prefix('+') {
        (Presence::Required, rest)
    } else if let Some(rest) = token.strip_prefix('-') {
        (Presence::Prohibited, rest)
    } else {
        (Presence::Optional, token)
    };

    let (field, rest) = match rest.split_once(':') {
        Some((name, value)) => match indexed_field(name) {
            Some(field) => (Some(field), value),
            None => (None, rest),
        },
        None => (None, rest),
    };

    let prefix = rest.ends_with('*');
    let text = rest.trim_matches('*').trim_matches('"');
    // Terms without any searchable characters would be dropped by the tokenizer
    // and make FTS5 reject the whole expression.
    if !text.chars().any(char::is_alphanumeric) {
        return None;
    }

    Some(QueryTerm {
        text: text.to_lowercase(),
        field,
        presence,
        prefix,
    })
}

/// Split a query into terms, skipping tokens with nothing searchable in them.
pub fn parse_query(query: &str) -> Vec<QueryTerm> {
    query.split_whitespace().filter_map(parse_term).collect()
}

/// Quote text as an FTS5 string (a phrase after tokenization).
pub fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Render a column filter for one or more fields, e.g. `{title description} : `.
pub fn column_filter(fields: &[&str]) -> String {
    match fields {
        [] => String::new(),
        [single] => format!("{} : ", single),
        many => format!("{{{}}} : ", many.join(" ")),
    }
}

fn render_term(term: &QueryTerm) -> String {
    let mut rendered = String::new();
    if let Some(field) = term.field {
        rendered.push_str(&column_filter(&[field]));
    }
    rendered.push_str(&quote(&term.text));
    if term.prefix {
        rendered.push_str(" *");
    }
    rendered
}

fn join_terms(terms: &[&QueryTerm], operator: &str) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    let rendered: Vec<String> = terms.iter().map(|t| render_term(t)).collect();
    Some(format!("({})", rendered.join(&format!(" {} ", operator))))
}

/// Build the MATCH plan for parsed terms. `None` when the query has no terms.
pub fn build_match_plan(terms: &[QueryTerm]) -> Option<MatchPlan> {
    if terms.is_empty() {
        return None;
    }
    let with = |presence: Presence| -> Vec<&QueryTerm> {
        terms.iter().filter(|t| t.presence == presence).collect()
    };
    let required = with(Presence::Required);
    let optional = with(Presence::Optional);
    let prohibited = with(Presence::Prohibited);

    // Optional terms only influence ranking once something is required.
    let include = join_terms(&required, "AND").or_else(|| join_terms(&optional, "OR"));
    let exclude = join_terms(&prohibited, "OR");
    Some(MatchPlan { include, exclude })
}
