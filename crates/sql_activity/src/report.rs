//! Text report of the SQL activity of one test run.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Result, SqlActivityError};
use crate::execution::{ExecutionCollection, QueryType};
use crate::select::{SelectAnalysisResult, analyze};
use crate::suggestion::{FrameworkSuggestions, SuggestionProvider};

pub const DEFAULT_FORMAT: &str = "[QUICK PERF] SQL Analyzis:\n%s";

pub const SEPARATOR: &str = "------------------------------------------------------------------------------------------------------------------------";

const SAME_SELECTS: &str = "- Same SELECT statements";
const LEADING_WILDCARD_LIKE: &str = "- Like with leading wildcard detected (% or _)";
const WITHOUT_BIND_PARAMETERS: &str = "- Query without bind parameters";

const COUNTED_TYPES: [QueryType; 4] = [
    QueryType::Select,
    QueryType::Insert,
    QueryType::Update,
    QueryType::Delete,
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Body,
}

/// Output template wrapping the report body.
///
/// Understands the `printf` conversions `%s` (the body, at most once), `%n`
/// (newline) and `%%` (a literal percent sign).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFormat {
    segments: Vec<Segment>,
}

impl ReportFormat {
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: &str| SqlActivityError::InvalidFormat {
            format: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut has_body = false;
        let mut chars = template.chars();

        while let Some(ch) = chars.next() {
            if ch != '%' {
                literal.push(ch);
                continue;
            }
            match chars.next() {
                Some('s') => {
                    if has_body {
                        return Err(invalid("`%s` may appear only once"));
                    }
                    has_body = true;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Body);
                }
                Some('n') => literal.push('\n'),
                Some('%') => literal.push('%'),
                Some(other) => return Err(invalid(&format!("unsupported conversion `%{other}`"))),
                None => return Err(invalid("dangling `%` at end of format")),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn apply(&self, body: &str) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Body => body,
            })
            .collect()
    }
}

impl Default for ReportFormat {
    fn default() -> Self {
        Self::parse(DEFAULT_FORMAT).expect("default format is valid")
    }
}

/// Where the caller should write the rendered report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReportSink {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub sink: ReportSink,
}

/// A built report. The body holds the report lines joined by `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    body: String,
    select_analysis: Option<SelectAnalysisResult>,
}

impl Report {
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.body.lines()
    }

    /// Analysis of the SELECT statements, absent when none were executed.
    pub fn select_analysis(&self) -> Option<&SelectAnalysisResult> {
        self.select_analysis.as_ref()
    }

    pub fn render(&self, format: &ReportFormat) -> String {
        format.apply(&self.body)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

/// Builds reports. Holds no per-run state, so one builder can serve any
/// number of runs, concurrently if the provider allows it.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder<P = FrameworkSuggestions> {
    config: ReportConfig,
    suggestions: P,
}

impl<P: SuggestionProvider> ReportBuilder<P> {
    pub fn new(config: ReportConfig, suggestions: P) -> Self {
        Self {
            config,
            suggestions,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn build(&self, executions: &ExecutionCollection) -> Report {
        let total = executions.count();
        let mut lines = vec![format!("SQL EXECUTIONS: {total}")];

        for query_type in COUNTED_TYPES {
            let count = executions.count_by_type(query_type);
            if count > 0 {
                lines.push(format!("{query_type}: {count}"));
            }
        }

        let select_analysis = (executions.count_by_type(QueryType::Select) > 0)
            .then(|| analyze(&executions.filter_by_type(QueryType::Select)));
        if let Some(analysis) = select_analysis
            .as_ref()
            .filter(|analysis| analysis.has_findings())
        {
            if analysis.duplicate_exact_selects {
                lines.push(SAME_SELECTS.to_string());
            }
            if analysis.leading_wildcard_like {
                lines.push(LEADING_WILDCARD_LIKE.to_string());
            }
            if analysis.missing_bind_parameters {
                lines.push(WITHOUT_BIND_PARAMETERS.to_string());
            }
        }

        for query_type in [QueryType::Insert, QueryType::Update, QueryType::Delete] {
            if executions.count_by_type(query_type) > 0
                && executions.filter_by_type(query_type).has_unbound_parameters()
            {
                lines.push(WITHOUT_BIND_PARAMETERS.to_string());
            }
        }

        if !executions.is_empty() {
            lines.push(format!("MAX TIME: {} ms", executions.max_elapsed_millis()));
            lines.push(if total == 1 { "QUERY:" } else { "QUERIES:" }.to_string());
            lines.extend(executions.iter().map(|record| format!("- {}", record.text())));
        }

        if select_analysis
            .as_ref()
            .is_some_and(|analysis| analysis.same_shape_different_params)
        {
            lines.push(SEPARATOR.to_string());
            lines.push("HINTS:".to_string());
            lines.extend(self.suggestions.suggestions());
        }

        debug!(
            executions = total,
            lines = lines.len(),
            "built sql activity report"
        );

        Report {
            body: lines.join("\n"),
            select_analysis,
        }
    }

    /// Builds the report and wraps it in the configured format.
    pub fn render(&self, executions: &ExecutionCollection) -> String {
        self.build(executions).render(&self.config.format)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::execution::StatementRecord;
    use crate::suggestion::{NoSuggestions, PersistenceFramework};

    fn builder() -> ReportBuilder<NoSuggestions> {
        ReportBuilder::new(ReportConfig::default(), NoSuggestions)
    }

    fn record(text: &str, query_type: QueryType, bound: bool, elapsed: u64) -> StatementRecord {
        StatementRecord::new(text, query_type, bound, elapsed)
    }

    #[test]
    fn empty_collection_reports_only_total() {
        let report = builder().build(&ExecutionCollection::new());
        assert_eq!(report.body(), "SQL EXECUTIONS: 0");
        assert!(report.select_analysis().is_none());
    }

    #[test]
    fn single_select_uses_singular_header() {
        let executions: ExecutionCollection =
            [record("SELECT * FROM book", QueryType::Select, true, 3)].into_iter().collect();
        assert_eq!(
            builder().build(&executions).body(),
            "SQL EXECUTIONS: 1\n\
             SELECT: 1\n\
             MAX TIME: 3 ms\n\
             QUERY:\n\
             - SELECT * FROM book"
        );
    }

    #[test]
    fn select_and_insert_report_counts_max_time_and_queries() {
        let executions: ExecutionCollection = [
            record("SELECT * FROM book WHERE id = ?", QueryType::Select, true, 5),
            record("INSERT INTO book (id, title) VALUES (?, ?)", QueryType::Insert, true, 12),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            builder().build(&executions).body(),
            "SQL EXECUTIONS: 2\n\
             SELECT: 1\n\
             INSERT: 1\n\
             MAX TIME: 12 ms\n\
             QUERIES:\n\
             - SELECT * FROM book WHERE id = ?\n\
             - INSERT INTO book (id, title) VALUES (?, ?)"
        );
    }

    #[test]
    fn single_unbound_leading_wildcard_select() {
        let executions: ExecutionCollection = [record(
            "SELECT * FROM book WHERE title LIKE '%foo'",
            QueryType::Select,
            false,
            6,
        )]
        .into_iter()
        .collect();
        assert_eq!(
            builder().build(&executions).body(),
            "SQL EXECUTIONS: 1\n\
             SELECT: 1\n\
             - Like with leading wildcard detected (% or _)\n\
             - Query without bind parameters\n\
             MAX TIME: 6 ms\n\
             QUERY:\n\
             - SELECT * FROM book WHERE title LIKE '%foo'"
        );
    }

    #[test]
    fn select_findings_follow_fixed_order() {
        let executions: ExecutionCollection = [
            record("SELECT * FROM book WHERE title LIKE '%foo'", QueryType::Select, false, 2),
            record("SELECT * FROM book WHERE title LIKE '%foo'", QueryType::Select, false, 4),
        ]
        .into_iter()
        .collect();
        let report = builder().build(&executions);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            &lines[..5],
            &[
                "SQL EXECUTIONS: 2",
                "SELECT: 2",
                "- Same SELECT statements",
                "- Like with leading wildcard detected (% or _)",
                "- Query without bind parameters",
            ]
        );
        assert!(!report.body().contains("HINTS:"));
    }

    #[test]
    fn unbound_writes_are_reported_per_type() {
        let executions: ExecutionCollection = [
            record("INSERT INTO book VALUES (1, 'x')", QueryType::Insert, false, 1),
            record("UPDATE book SET title = ? WHERE id = ?", QueryType::Update, true, 1),
            record("DELETE FROM book WHERE id = 1", QueryType::Delete, false, 1),
        ]
        .into_iter()
        .collect();
        let report = builder().build(&executions);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            &lines[..7],
            &[
                "SQL EXECUTIONS: 3",
                "INSERT: 1",
                "UPDATE: 1",
                "DELETE: 1",
                "- Query without bind parameters",
                "- Query without bind parameters",
                "MAX TIME: 1 ms",
            ]
        );
    }

    #[test]
    fn other_statements_count_only_toward_total() {
        let executions: ExecutionCollection =
            [record("CREATE TABLE t (id INT)", QueryType::Other, false, 7)].into_iter().collect();
        assert_eq!(
            builder().build(&executions).body(),
            "SQL EXECUTIONS: 1\nMAX TIME: 7 ms\nQUERY:\n- CREATE TABLE t (id INT)"
        );
    }

    #[test]
    fn n_plus_one_appends_hint_block() {
        let executions: ExecutionCollection = [
            record("SELECT * FROM book WHERE author_id = 1", QueryType::Select, true, 1),
            record("SELECT * FROM book WHERE author_id = 2", QueryType::Select, true, 1),
        ]
        .into_iter()
        .collect();
        let provider = || vec!["first hint".to_string(), "second hint".to_string()];
        let report = ReportBuilder::new(ReportConfig::default(), provider).build(&executions);
        let tail: Vec<&str> = report.lines().rev().take(4).collect();
        assert_eq!(tail, vec!["second hint", "first hint", "HINTS:", SEPARATOR]);
        assert_eq!(SEPARATOR.len(), 120);
        assert!(
            report
                .select_analysis()
                .is_some_and(|analysis| analysis.same_shape_different_params)
        );
    }

    #[test]
    fn default_builder_uses_framework_hints() {
        let executions: ExecutionCollection = [
            record("SELECT * FROM book WHERE author_id = 1", QueryType::Select, true, 1),
            record("SELECT * FROM book WHERE author_id = 2", QueryType::Select, true, 1),
        ]
        .into_iter()
        .collect();
        let builder = ReportBuilder::new(
            ReportConfig::default(),
            FrameworkSuggestions::new([PersistenceFramework::Hibernate]),
        );
        let body = builder.build(&executions).body().to_string();
        assert!(body.contains("server round trips"), "{body}");
        assert!(body.contains("With Hibernate"), "{body}");
    }

    #[test]
    fn render_wraps_body_in_default_format() {
        assert_eq!(
            builder().render(&ExecutionCollection::new()),
            "[QUICK PERF] SQL Analyzis:\nSQL EXECUTIONS: 0"
        );
    }

    #[test]
    fn format_supports_printf_conversions() {
        let format = ReportFormat::parse("100%% sql%n%s%n").unwrap();
        assert_eq!(format.apply("body 50%"), "100% sql\nbody 50%\n");
        assert_eq!(ReportFormat::parse("static").unwrap().apply("ignored"), "static");
    }

    #[test]
    fn format_rejects_bad_templates() {
        for template in ["%s %s", "%d", "trailing %"] {
            let err = ReportFormat::parse(template).unwrap_err();
            assert!(
                matches!(err, SqlActivityError::InvalidFormat { .. }),
                "{template}: {err}"
            );
        }
    }
}
