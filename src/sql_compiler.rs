//! SQL compiler that turns a segment tree into a parameterized Postgres query.
//!
//! The walker threads an explicit [`Fragment`] (SQL text, bound arguments and
//! the next placeholder index) through every recursive call, so placeholder
//! numbering stays global and gap-free without any shared counter.

use sea_query::{Expr, Iden, PostgresQueryBuilder, Query, Value};
use tracing::{debug, trace};

use crate::ast::{Branch, FilterTree, Leaf, LeafCondition};
use crate::config::{CompilerConfig, ConfigError};
use crate::error::CompileError;
use crate::whitelist::Whitelist;

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Compiled query: SQL text plus arguments in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Partial compilation output of one subtree
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Fragment {
    pub sql: String,
    pub args: Vec<Value>,
    pub next_param: usize,
}

impl Fragment {
    pub fn empty(next_param: usize) -> Self {
        Self {
            sql: String::new(),
            args: Vec::new(),
            next_param,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Binds one argument and returns its placeholder.
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        let placeholder = placeholder(self.next_param);
        self.args.push(value.into());
        self.next_param += 1;
        placeholder
    }

    /// Takes over a child compiled from `self.next_param`, returning its SQL.
    pub fn absorb(&mut self, child: Fragment) -> String {
        debug_assert_eq!(self.next_param + child.args.len(), child.next_param);
        self.args.extend(child.args);
        self.next_param = child.next_param;
        child.sql
    }
}

pub(crate) fn placeholder(index: usize) -> String {
    format!("${}", index)
}

/// Branch combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchOperator {
    And,
    Or,
}

impl BranchOperator {
    fn parse(operator: Option<&str>) -> Result<Self, CompileError> {
        match operator.map(str::trim) {
            None | Some("") => Ok(BranchOperator::And),
            Some(op) if op.eq_ignore_ascii_case("and") => Ok(BranchOperator::And),
            Some(op) if op.eq_ignore_ascii_case("or") => Ok(BranchOperator::Or),
            Some(other) => Err(CompileError::domain("branch operator", other)),
        }
    }

    fn joiner(&self) -> &'static str {
        match self {
            BranchOperator::And => " AND ",
            BranchOperator::Or => " OR ",
        }
    }
}

/// SQL Compiler that converts segment trees to SQL queries
///
/// Holds only immutable state; a single instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    pub(crate) whitelist: Whitelist,
    pub(crate) config: CompilerConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self {
            whitelist: Whitelist::new(),
            config: CompilerConfig::default(),
        }
    }

    pub fn from_config(config: CompilerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            whitelist: Whitelist::new(),
            config,
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a segment tree into SQL and its positional arguments.
    pub fn compile(&self, tree: &FilterTree) -> Result<CompileResult, CompileError> {
        let result = self.check_limits(tree).and_then(|_| self.compile_node(tree, 1));
        let fragment = match result {
            Ok(fragment) => fragment,
            Err(e) => {
                debug!(error = %e, "rejected segment tree");
                return Err(e);
            }
        };

        let sql = self.assemble(fragment.sql);
        debug!(
            params = fragment.args.len(),
            sql_len = sql.len(),
            "compiled segment tree"
        );
        Ok(CompileResult {
            sql,
            args: fragment.args,
        })
    }

    /// Decode the editor's JSON document and compile it.
    ///
    /// A `null` document is reported as a structural error.
    pub fn compile_json(&self, json: &str) -> Result<CompileResult, CompileError> {
        let tree: Option<FilterTree> = serde_json::from_str(json).map_err(|e| {
            CompileError::structural(format!("cannot decode segment tree: {}", e))
        })?;
        let tree = tree.ok_or_else(|| CompileError::structural("segment tree is null"))?;
        self.compile(&tree)
    }

    /// Iterative walk; stops at the first limit exceeded.
    fn check_limits(&self, tree: &FilterTree) -> Result<(), CompileError> {
        let max_depth = self.config.max_depth;
        let max_nodes = self.config.max_nodes;

        let mut stack = vec![(tree, 1usize)];
        let mut seen = 1usize;
        while let Some((node, depth)) = stack.pop() {
            if depth > max_depth {
                return Err(CompileError::structural(format!(
                    "tree depth exceeds the limit of {}",
                    max_depth
                )));
            }
            if let FilterTree::Branch(branch) = node {
                seen += branch.children.len();
                if seen > max_nodes {
                    return Err(CompileError::structural(format!(
                        "tree has more than {} nodes",
                        max_nodes
                    )));
                }
                stack.extend(branch.children.iter().map(|child| (child, depth + 1)));
            }
        }
        Ok(())
    }

    fn compile_node(&self, node: &FilterTree, param: usize) -> Result<Fragment, CompileError> {
        match node {
            FilterTree::Branch(branch) => self.compile_branch(branch, param),
            FilterTree::Leaf(leaf) => self.compile_leaf(leaf, param),
        }
    }

    /// Empty children are dropped; a single survivor is returned unwrapped and
    /// several are joined and parenthesized.
    fn compile_branch(&self, branch: &Branch, param: usize) -> Result<Fragment, CompileError> {
        let operator = BranchOperator::parse(branch.operator.as_deref())?;

        let mut out = Fragment::empty(param);
        let mut parts = Vec::with_capacity(branch.children.len());
        for child in &branch.children {
            let fragment = self.compile_node(child, out.next_param)?;
            if fragment.is_empty() {
                continue;
            }
            parts.push(out.absorb(fragment));
        }

        out.sql = match parts.len() {
            0 => String::new(),
            1 => parts.swap_remove(0),
            _ => format!("({})", parts.join(operator.joiner())),
        };
        Ok(out)
    }

    fn compile_leaf(&self, leaf: &Leaf, param: usize) -> Result<Fragment, CompileError> {
        trace!(table = %leaf.table, param, "compiling leaf");
        match leaf.condition()? {
            LeafCondition::Contacts(condition) => self.compile_entity(condition, param),
            LeafCondition::ContactLists(condition) => self.compile_membership(condition, param),
            LeafCondition::ContactTimeline(condition) => self.compile_timeline(condition, param),
        }
    }

    fn assemble(&self, where_sql: String) -> String {
        let mut select = Query::select();
        select
            .columns(
                self.config
                    .projection
                    .iter()
                    .map(|column| ColumnName(column.clone())),
            )
            .from(TableName(self.config.tables.contacts.clone()));

        if !where_sql.is_empty() {
            select.and_where(Expr::cust(where_sql));
        }

        select.to_string(PostgresQueryBuilder)
    }
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new()
    }
}
