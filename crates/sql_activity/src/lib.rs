//! Analysis of the SQL statements executed while a test ran.
//!
//! A capture layer records every statement into an [`ExecutionCollection`].
//! [`ReportBuilder::build`] counts statements per type, looks for duplicate
//! SELECTs, N+1 selects, leading wildcard LIKEs and inlined values, and
//! renders a plain text [`Report`]. Writing the report anywhere is left to
//! the caller.

pub mod error;
pub mod execution;
pub mod report;
pub mod select;
pub mod shape;
pub mod suggestion;

pub use error::{Result, SqlActivityError};
pub use execution::{ExecutionCollection, QueryType, StatementRecord};
pub use report::{
    DEFAULT_FORMAT, Report, ReportBuilder, ReportConfig, ReportFormat, ReportSink, SEPARATOR,
};
pub use select::{N1Finding, SelectAnalysisResult, analyze};
pub use shape::normalize;
pub use suggestion::{
    FrameworkSuggestions, NoSuggestions, PersistenceFramework, SuggestionProvider,
};
