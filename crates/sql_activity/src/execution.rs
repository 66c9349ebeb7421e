//! Captured statement executions.
//!
//! A [`StatementRecord`] describes one JDBC-style execution observed while a
//! test ran. Records are gathered in execution order into an
//! [`ExecutionCollection`], which is frozen before it reaches the analyzers.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::trace;

use crate::error::{Result, SqlActivityError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl QueryType {
    pub const ALL: [QueryType; 5] = [
        QueryType::Select,
        QueryType::Insert,
        QueryType::Update,
        QueryType::Delete,
        QueryType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Other => "OTHER",
        }
    }

    /// Classifies a statement by the keyword that starts its main body.
    ///
    /// Leading whitespace, comments and opening parentheses are skipped. For a
    /// `WITH` statement the first top-level SELECT/INSERT/UPDATE/DELETE after
    /// the common table expressions decides the type.
    pub fn classify(text: &str) -> QueryType {
        let dialect = GenericDialect {};
        match Tokenizer::new(&dialect, text).tokenize() {
            Ok(tokens) => classify_tokens(&tokens),
            Err(err) => {
                trace!(%err, "tokenizer rejected statement, classifying by leading word");
                text.split_whitespace()
                    .next()
                    .map(|word| word.trim_start_matches('('))
                    .and_then(|word| word.parse().ok())
                    .unwrap_or(QueryType::Other)
            }
        }
    }

    fn from_keyword(keyword: Keyword) -> Option<QueryType> {
        match keyword {
            Keyword::SELECT => Some(QueryType::Select),
            Keyword::INSERT => Some(QueryType::Insert),
            Keyword::UPDATE => Some(QueryType::Update),
            Keyword::DELETE => Some(QueryType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = SqlActivityError;

    fn from_str(s: &str) -> Result<Self> {
        QueryType::ALL
            .into_iter()
            .find(|query_type| query_type.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SqlActivityError::UnknownQueryType(s.to_string()))
    }
}

fn classify_tokens(tokens: &[Token]) -> QueryType {
    let mut depth = 0usize;
    let mut cte_depth: Option<usize> = None;

    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(word) if word.quote_style.is_none() => match cte_depth {
                None if word.keyword == Keyword::WITH => cte_depth = Some(depth),
                None => return QueryType::from_keyword(word.keyword).unwrap_or(QueryType::Other),
                Some(base) if depth == base => {
                    if let Some(query_type) = QueryType::from_keyword(word.keyword) {
                        return query_type;
                    }
                }
                Some(_) => {}
            },
            Token::Whitespace(_) => {}
            _ if cte_depth.is_none() => return QueryType::Other,
            _ => {}
        }
    }

    QueryType::Other
}

/// One executed statement. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRecord {
    text: String,
    query_type: QueryType,
    bound_parameters: bool,
    elapsed_millis: u64,
}

impl StatementRecord {
    pub fn new(
        text: impl Into<String>,
        query_type: QueryType,
        bound_parameters: bool,
        elapsed_millis: u64,
    ) -> Self {
        Self {
            text: text.into(),
            query_type,
            bound_parameters,
            elapsed_millis,
        }
    }

    /// Builds a record whose type is derived from the statement text.
    pub fn classified(text: impl Into<String>, bound_parameters: bool, elapsed_millis: u64) -> Self {
        let text = text.into();
        let query_type = QueryType::classify(&text);
        Self::new(text, query_type, bound_parameters, elapsed_millis)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// True when every literal-like value was supplied through a bind parameter.
    pub fn bound_parameters(&self) -> bool {
        self.bound_parameters
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed_millis
    }
}

#[derive(Debug, Deserialize)]
struct CapturedExecution {
    text: String,
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default = "default_bound_parameters")]
    bound_parameters: bool,
    #[serde(default)]
    elapsed_millis: u64,
}

fn default_bound_parameters() -> bool {
    true
}

impl CapturedExecution {
    fn into_record(self) -> Result<StatementRecord> {
        let query_type = match self.query_type.as_deref() {
            Some(name) => name.parse()?,
            None => QueryType::classify(&self.text),
        };
        Ok(StatementRecord::new(
            self.text,
            query_type,
            self.bound_parameters,
            self.elapsed_millis,
        ))
    }
}

/// Statement records of one test run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCollection {
    records: Vec<StatementRecord>,
}

impl ExecutionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record while capture is still in progress.
    pub fn push(&mut self, record: StatementRecord) {
        self.records.push(record);
    }

    /// Decodes one JSON object per line.
    ///
    /// Blank lines and lines starting with `#` are ignored. `query_type` is
    /// optional and classified from the text when missing; `bound_parameters`
    /// defaults to `true` and `elapsed_millis` to `0`.
    pub fn from_json_lines(contents: &str) -> Result<Self> {
        let mut collection = Self::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let captured: CapturedExecution =
                serde_json::from_str(line).map_err(|source| SqlActivityError::Decode {
                    line: index + 1,
                    source,
                })?;
            collection.push(captured.into_record()?);
        }
        Ok(collection)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StatementRecord> {
        self.records.iter()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_by_type(&self, query_type: QueryType) -> usize {
        self.records
            .iter()
            .filter(|record| record.query_type == query_type)
            .count()
    }

    /// Returns the records of `query_type`, keeping execution order.
    pub fn filter_by_type(&self, query_type: QueryType) -> ExecutionCollection {
        self.records
            .iter()
            .filter(|record| record.query_type == query_type)
            .cloned()
            .collect()
    }

    /// Longest elapsed time of any record, `0` when empty.
    pub fn max_elapsed_millis(&self) -> u64 {
        self.records
            .iter()
            .map(StatementRecord::elapsed_millis)
            .max()
            .unwrap_or(0)
    }

    /// True when at least one record inlined its values instead of binding them.
    pub fn has_unbound_parameters(&self) -> bool {
        self.records.iter().any(|record| !record.bound_parameters)
    }
}

impl FromIterator<StatementRecord> for ExecutionCollection {
    fn from_iter<I: IntoIterator<Item = StatementRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ExecutionCollection {
    type Item = &'a StatementRecord;
    type IntoIter = std::slice::Iter<'a, StatementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
