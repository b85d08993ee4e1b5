//! Log levels carried by state machine actions.

/// Severity of a `Log` action.
///
/// State machines never write logs themselves; drivers map these onto their
/// logging backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}
