//! Sylvan: a parallel decision-diagram engine.
//!
//! Binary, zero-suppressed, multi-terminal, list, and tagged decision
//! diagrams (BDD/ZDD/MTBDD/LDD/TBDD) share one lock-free unique node
//! table, one operation cache, and one work-stealing runtime; each kind
//! module only supplies its own canonicalization rule and operator set.

pub mod error;
pub mod vid;
pub mod nid;
pub mod levels;
pub mod table;
pub mod opcache;
pub mod runtime;
pub mod refs;
pub mod gc;
pub mod kind;

pub mod bdd;
pub mod zdd;
pub mod mtbdd;
pub mod ldd;
pub mod tbdd;

pub mod reorder;
pub mod serialize;
pub mod config;
pub mod sylvan;

pub use error::{Result, SylvanError};
pub use nid::Nid;
pub use vid::Vid;
pub use sylvan::Sylvan;
