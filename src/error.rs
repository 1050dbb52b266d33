//! Error handling for the engine.
//!
//! Fatal conditions (table full after GC, rehash failure) can't be
//! recovered from -- they abort the process after logging, the same way
//! the original C engine calls `Abort()`. Reorder failures are the only
//! recoverable error and come back as a `Result`.
use std::fmt;

/// Why a reorder operation (swap or sift) stopped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderFailure {
    /// Phase 2 needed to create a node but the unique table had no room,
    /// even after GC. The swap was rolled back; no net change occurred.
    TableFull,
    /// Rehashing a node during recovery also failed. This should not
    /// happen if `TableFull` recovery itself succeeded; kept distinct so
    /// callers can tell "rolled back cleanly" from "rollback also broke".
    RehashFailed,
}

impl fmt::Display for ReorderFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReorderFailure::TableFull => write!(f, "unique table full during reorder; rolled back"),
            ReorderFailure::RehashFailed => write!(f, "rehash failed during reorder recovery"),
        }
    }
}

/// Why sifting stopped. Not an error -- just the reason it returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// Ran out of swaps to try (converged).
    Converged,
    /// Hit `max_swap`.
    SwapBudget,
    /// Hit `max_var`.
    VarBudget,
    /// Hit `time_limit_ms`.
    TimeLimit,
    /// The user-supplied termination callback returned true.
    UserRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SylvanError {
    Reorder(ReorderFailure),
}

impl fmt::Display for SylvanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SylvanError::Reorder(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SylvanError {}

impl From<ReorderFailure> for SylvanError {
    fn from(e: ReorderFailure) -> Self { SylvanError::Reorder(e) }
}

pub type Result<T> = std::result::Result<T, SylvanError>;

/// Log a fatal diagnostic and abort the process. This is the engine's only
/// response to table-full-after-gc and rehash-failure: both indicate an
/// under-sized table or pathological hashing that no amount of retrying
/// will fix.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        eprintln!("sylvan: fatal error at {}:{}: {}", file!(), line!(), format!($($arg)*));
        std::process::abort();
    }};
}
