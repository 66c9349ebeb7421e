//! Anti-pattern detection over the SELECT statements of a run.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::execution::{ExecutionCollection, StatementRecord};
use crate::shape::normalize;

static LEADING_WILDCARD_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\blike\s*['"][%_]"#).expect("valid regex"));

/// A query shape executed with more than one distinct set of literal values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct N1Finding {
    pub template: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectAnalysisResult {
    /// Two or more statements with identical text.
    pub duplicate_exact_selects: bool,
    /// Two or more statements sharing a shape but not their text; the N+1 hint.
    pub same_shape_different_params: bool,
    /// A `LIKE` pattern literal starting with `%` or `_`.
    pub leading_wildcard_like: bool,
    /// A statement executed with inlined values.
    pub missing_bind_parameters: bool,
    /// Shapes that triggered `same_shape_different_params`, in first-occurrence order.
    pub n1_findings: Vec<N1Finding>,
}

impl SelectAnalysisResult {
    pub fn has_findings(&self) -> bool {
        self.duplicate_exact_selects
            || self.same_shape_different_params
            || self.leading_wildcard_like
            || self.missing_bind_parameters
    }
}

/// Analyzes the SELECT subset of a run.
///
/// The input is expected to contain SELECT records only; an empty input
/// yields the all-false result.
pub fn analyze(selects: &ExecutionCollection) -> SelectAnalysisResult {
    let duplicate_exact_selects = group_in_order(selects, |record| record.text().to_string())
        .iter()
        .any(|group| group.len() >= 2);

    let n1_findings = group_in_order(selects, |record| normalize(record.text()))
        .into_iter()
        .filter(|group| group.len() >= 2)
        .filter(|group| {
            let first = group[0].text();
            group.iter().any(|record| record.text() != first)
        })
        .map(|group| N1Finding {
            template: normalize(group[0].text()),
            count: group.len(),
        })
        .collect::<Vec<_>>();

    let result = SelectAnalysisResult {
        duplicate_exact_selects,
        same_shape_different_params: !n1_findings.is_empty(),
        leading_wildcard_like: selects.iter().any(|record| has_leading_wildcard_like(record.text())),
        missing_bind_parameters: selects.has_unbound_parameters(),
        n1_findings,
    };

    debug!(
        selects = selects.count(),
        duplicate_exact_selects = result.duplicate_exact_selects,
        same_shape_different_params = result.same_shape_different_params,
        leading_wildcard_like = result.leading_wildcard_like,
        missing_bind_parameters = result.missing_bind_parameters,
        "analyzed select statements"
    );
    for finding in &result.n1_findings {
        debug!(template = %finding.template, count = finding.count, "repeated select shape");
    }

    result
}

/// True when the statement contains `LIKE '%...'` or `LIKE '_...'`.
pub fn has_leading_wildcard_like(text: &str) -> bool {
    LEADING_WILDCARD_LIKE.is_match(text)
}

/// Groups records by `key`, ordering groups by the first occurrence of their key.
fn group_in_order<'a, F>(records: &'a ExecutionCollection, key: F) -> Vec<Vec<&'a StatementRecord>>
where
    F: Fn(&StatementRecord) -> String,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<&StatementRecord>> = Vec::new();
    for record in records {
        let slot = *index.entry(key(record)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::QueryType;

    fn selects(texts: &[&str]) -> ExecutionCollection {
        texts
            .iter()
            .map(|text| StatementRecord::new(*text, QueryType::Select, true, 1))
            .collect()
    }

    #[test]
    fn empty_input_has_no_findings() {
        let result = analyze(&ExecutionCollection::new());
        assert_eq!(result, SelectAnalysisResult::default());
        assert!(!result.has_findings());
    }

    #[test]
    fn identical_selects_are_duplicates_not_n1() {
        let result = analyze(&selects(&[
            "SELECT * FROM book WHERE id = 1",
            "SELECT * FROM book WHERE id = 1",
        ]));
        assert!(result.duplicate_exact_selects);
        assert!(!result.same_shape_different_params);
        assert!(result.n1_findings.is_empty());
    }

    #[test]
    fn same_shape_with_different_values_is_n1() {
        let result = analyze(&selects(&[
            "SELECT * FROM author WHERE id = 7",
            "SELECT * FROM book WHERE id = 1",
            "SELECT * FROM book WHERE id = 2",
            "SELECT * FROM book WHERE id = 3",
        ]));
        assert!(!result.duplicate_exact_selects);
        assert!(result.same_shape_different_params);
        assert_eq!(
            result.n1_findings,
            vec![N1Finding {
                template: "SELECT * FROM book WHERE id = ?".to_string(),
                count: 3,
            }]
        );
    }

    #[test]
    fn commented_lookups_share_a_shape() {
        let result = analyze(&selects(&[
            "SELECT * FROM book WHERE author_id = 1 -- author's books",
            "SELECT * FROM book WHERE author_id = 2 -- author's books",
        ]));
        assert!(result.same_shape_different_params);
        assert_eq!(
            result.n1_findings,
            vec![N1Finding {
                template: "SELECT * FROM book WHERE author_id = ?".to_string(),
                count: 2,
            }]
        );
    }

    #[test]
    fn exact_pair_and_varying_pair_both_fire() {
        let result = analyze(&selects(&[
            "SELECT * FROM book WHERE id = 1",
            "SELECT * FROM book WHERE id = 1",
            "SELECT * FROM book WHERE id = 2",
        ]));
        assert!(result.duplicate_exact_selects);
        assert!(result.same_shape_different_params);
    }

    #[test]
    fn n1_findings_follow_first_occurrence() {
        let result = analyze(&selects(&[
            "SELECT * FROM book WHERE id = 1",
            "SELECT * FROM author WHERE name = 'a'",
            "SELECT * FROM author WHERE name = 'b'",
            "SELECT * FROM book WHERE id = 2",
        ]));
        let templates: Vec<&str> = result
            .n1_findings
            .iter()
            .map(|finding| finding.template.as_str())
            .collect();
        assert_eq!(
            templates,
            vec![
                "SELECT * FROM book WHERE id = ?",
                "SELECT * FROM author WHERE name = ?",
            ]
        );
    }

    #[test]
    fn leading_wildcard_like_is_detected() {
        assert!(has_leading_wildcard_like("SELECT * FROM book WHERE title LIKE '%foo'"));
        assert!(has_leading_wildcard_like("select * from book where title like '_oo%'"));
        assert!(has_leading_wildcard_like("SELECT * FROM book WHERE title NOT LIKE\n\"%x\""));
        assert!(!has_leading_wildcard_like("SELECT * FROM book WHERE title LIKE 'foo%'"));
        assert!(!has_leading_wildcard_like("SELECT * FROM book WHERE title LIKE ?"));
        assert!(!has_leading_wildcard_like("SELECT unlike FROM book WHERE x = '%'"));

        let result = analyze(&selects(&["SELECT * FROM book WHERE title LIKE '%foo'"]));
        assert!(result.leading_wildcard_like);
        assert!(!result.duplicate_exact_selects);
    }

    #[test]
    fn unbound_select_is_flagged() {
        let collection: ExecutionCollection = [
            StatementRecord::new("SELECT * FROM book WHERE id = ?", QueryType::Select, true, 1),
            StatementRecord::new("SELECT * FROM book WHERE id = 5", QueryType::Select, false, 1),
        ]
        .into_iter()
        .collect();
        assert!(analyze(&collection).missing_bind_parameters);
        assert!(!analyze(&selects(&["SELECT 1"])).missing_bind_parameters);
    }
}
