//! Segment tree to SQL compiler.
//!
//! Turns a nested AND/OR audience filter over contacts, list memberships and
//! timeline events into one parameterized Postgres query.
//!
//! ```no_run
//! use segment_compiler::{DimensionFilter, FilterTree, SqlCompiler};
//!
//! let compiler = SqlCompiler::new();
//! let tree = FilterTree::contacts(vec![
//!     DimensionFilter::new("email", "contains").with_strings(["acme"]),
//! ]);
//! let result = compiler.compile(&tree).unwrap();
//! assert!(result.sql.contains("email ILIKE $1"));
//! ```

pub mod ast;
mod conditions;
pub mod config;
pub mod error;
mod filters;
pub mod sql_compiler;
pub mod whitelist;

pub use ast::{
    Branch, DimensionFilter, EntityCondition, FilterTree, Leaf, MembershipCondition,
    TimelineCondition,
};
pub use conditions::MAX_RELATIVE_DAYS;
pub use config::{CompilerConfig, ConfigError, IntervalMode, TableNames};
pub use error::{CompileError, WhitelistKind};
pub use sql_compiler::{CompileResult, SqlCompiler};
pub use whitelist::{FieldType, Whitelist};
