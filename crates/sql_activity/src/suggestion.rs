//! Remediation hints appended when the N+1 heuristic fires.
//!
//! Which hints apply depends on the persistence framework used by the code
//! under test. Detecting that framework is the caller's business; the report
//! only asks a [`SuggestionProvider`] for the hint texts.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SqlActivityError;

/// Capability returning the hint texts to print under `HINTS:`.
pub trait SuggestionProvider {
    fn suggestions(&self) -> Vec<String>;
}

impl<F> SuggestionProvider for F
where
    F: Fn() -> Vec<String>,
{
    fn suggestions(&self) -> Vec<String> {
        self()
    }
}

/// Provider that never suggests anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSuggestions;

impl SuggestionProvider for NoSuggestions {
    fn suggestions(&self) -> Vec<String> {
        Vec::new()
    }
}

pub const SERVER_ROUND_TRIPS: &str = "\u{1F4A1} Perhaps you are facing server round trips\n\
\t Each JDBC execution is a round trip between the application and the database server.\n\
\t Grouping the same statements into a single one (for example with an IN clause) or \
using JDBC batching reduces the number of round trips.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PersistenceFramework {
    Hibernate,
    MicronautData,
}

impl PersistenceFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hibernate => "hibernate",
            Self::MicronautData => "micronaut-data",
        }
    }

    /// Framework-specific advice for an N+1 select.
    pub fn n_plus_one_select_hint(&self) -> &'static str {
        match self {
            Self::Hibernate => {
                "\u{1F4A1} Perhaps you are facing a N+1 select issue\n\
\t * With Hibernate, you may fix it by using JOIN FETCH\n\
\t                                       or LEFT JOIN FETCH\n\
\t                                       or FetchType.LAZY\n\
\t                                       or ...\n\
\t Some examples: https://stackoverflow.com/questions/32453989/what-is-the-solution-for-the-n1-issue-in-jpa-and-hibernate"
            }
            Self::MicronautData => {
                "\u{1F4A1} Perhaps you are facing a N+1 select issue\n\
\t With Micronaut Data, you may fix it by using the @Join annotation on your repository interface:\n\
\t https://micronaut-projects.github.io/micronaut-data/latest/guide/#joinQueries"
            }
        }
    }
}

impl fmt::Display for PersistenceFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersistenceFramework {
    type Err = SqlActivityError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hibernate" => Ok(Self::Hibernate),
            "micronaut" | "micronaut-data" => Ok(Self::MicronautData),
            _ => Err(SqlActivityError::UnknownFramework(s.to_string())),
        }
    }
}

/// The round-trip hint, followed by one N+1 hint per detected framework.
#[derive(Debug, Clone, Default)]
pub struct FrameworkSuggestions {
    frameworks: BTreeSet<PersistenceFramework>,
}

impl FrameworkSuggestions {
    pub fn new(frameworks: impl IntoIterator<Item = PersistenceFramework>) -> Self {
        Self {
            frameworks: frameworks.into_iter().collect(),
        }
    }
}

impl SuggestionProvider for FrameworkSuggestions {
    fn suggestions(&self) -> Vec<String> {
        std::iter::once(SERVER_ROUND_TRIPS)
            .chain(self.frameworks.iter().map(|framework| framework.n_plus_one_select_hint()))
            .map(str::to_string)
            .collect()
    }
}
