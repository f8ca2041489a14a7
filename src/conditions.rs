//! Leaf condition compilation: contact filters, list membership and timeline
//! event counts.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::ast::{EntityCondition, MembershipCondition, TimelineCondition};
use crate::config::IntervalMode;
use crate::error::CompileError;
use crate::filters::{compile_filter, parse_time, FieldAccess};
use crate::sql_compiler::{Fragment, SqlCompiler};

/// Upper bound for `in_the_last_days`, roughly a century.
pub const MAX_RELATIVE_DAYS: u32 = 36_500;

const MEMBERSHIP_ALIAS: &str = "cl";
const LIST_ALIAS: &str = "l";
const EVENT_ALIAS: &str = "e";

/// Event count comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountOperator {
    AtLeast,
    AtMost,
    Exactly,
}

impl CountOperator {
    fn parse(operator: &str) -> Result<Self, CompileError> {
        match operator {
            "at_least" => Ok(CountOperator::AtLeast),
            "at_most" => Ok(CountOperator::AtMost),
            "exactly" => Ok(CountOperator::Exactly),
            other => Err(CompileError::domain("count operator", other)),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            CountOperator::AtLeast => ">=",
            CountOperator::AtMost => "<=",
            CountOperator::Exactly => "=",
        }
    }
}

/// Validated time window of a timeline condition
#[derive(Debug, Clone, PartialEq)]
enum Timeframe {
    Anytime,
    InDateRange(DateTime<Utc>, DateTime<Utc>),
    BeforeDate(DateTime<Utc>),
    AfterDate(DateTime<Utc>),
    InTheLastDays(u32),
}

impl Timeframe {
    fn parse(operator: Option<&str>, values: &[String]) -> Result<Self, CompileError> {
        let operator = match operator {
            None | Some("") => return Ok(Timeframe::Anytime),
            Some(op) => op,
        };

        let expect = |count: usize| {
            if values.len() == count {
                Ok(())
            } else {
                Err(CompileError::arity(
                    "timeframe_values",
                    operator,
                    count,
                    values.len(),
                ))
            }
        };

        match operator {
            "anytime" => Ok(Timeframe::Anytime),
            "in_date_range" => {
                expect(2)?;
                Ok(Timeframe::InDateRange(
                    parse_time("timeframe_values", &values[0])?,
                    parse_time("timeframe_values", &values[1])?,
                ))
            }
            "before_date" => {
                expect(1)?;
                Ok(Timeframe::BeforeDate(parse_time("timeframe_values", &values[0])?))
            }
            "after_date" => {
                expect(1)?;
                Ok(Timeframe::AfterDate(parse_time("timeframe_values", &values[0])?))
            }
            "in_the_last_days" => {
                expect(1)?;
                Ok(Timeframe::InTheLastDays(parse_days(&values[0])?))
            }
            other => Err(CompileError::domain("timeframe operator", other)),
        }
    }
}

/// Accepts only plain ASCII digits within `1..=MAX_RELATIVE_DAYS`.
fn parse_days(literal: &str) -> Result<u32, CompileError> {
    let invalid = || CompileError::domain("day count", literal);
    if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let days: u32 = literal.parse().map_err(|_| invalid())?;
    if days == 0 || days > MAX_RELATIVE_DAYS {
        return Err(invalid());
    }
    Ok(days)
}

impl SqlCompiler {
    /// Filters are AND-joined and parenthesized; no filters means no SQL.
    pub(crate) fn compile_entity(
        &self,
        condition: &EntityCondition,
        param: usize,
    ) -> Result<Fragment, CompileError> {
        let mut out = Fragment::empty(param);
        let mut parts = Vec::with_capacity(condition.filters.len());
        for filter in &condition.filters {
            let fragment =
                compile_filter(&self.whitelist, filter, FieldAccess::Column, out.next_param)?;
            if !fragment.is_empty() {
                parts.push(out.absorb(fragment));
            }
        }

        if !parts.is_empty() {
            out.sql = format!("({})", parts.join(" AND "));
        }
        Ok(out)
    }

    pub(crate) fn compile_membership(
        &self,
        condition: &MembershipCondition,
        param: usize,
    ) -> Result<Fragment, CompileError> {
        let negate = match condition.operator.as_deref() {
            None | Some("") | Some("in") => false,
            Some("not_in") => true,
            Some(other) => return Err(CompileError::domain("membership operator", other)),
        };
        if condition.list_id.trim().is_empty() {
            return Err(CompileError::structural(
                "contact_list condition requires a non-empty `list_id`",
            ));
        }

        let tables = &self.config.tables;
        let mut out = Fragment::empty(param);
        let mut predicates = vec![
            format!("{}.email = {}.email", MEMBERSHIP_ALIAS, tables.contacts),
            format!(
                "{}.list_id = {}",
                MEMBERSHIP_ALIAS,
                out.bind(condition.list_id.clone())
            ),
        ];
        if let Some(status) = condition.status.as_deref().filter(|s| !s.is_empty()) {
            predicates.push(format!(
                "{}.status = {}",
                MEMBERSHIP_ALIAS,
                out.bind(status.to_string())
            ));
        }
        predicates.push(format!("{}.deleted_at IS NULL", LIST_ALIAS));

        let exists = format!(
            "EXISTS (SELECT 1 FROM {} {m} JOIN {} {l} ON {l}.id = {m}.list_id WHERE {})",
            tables.contact_lists,
            tables.lists,
            predicates.join(" AND "),
            m = MEMBERSHIP_ALIAS,
            l = LIST_ALIAS,
        );
        out.sql = if negate {
            format!("NOT {}", exists)
        } else {
            exists
        };
        Ok(out)
    }

    /// `(SELECT COUNT(*) ...) <cmp> $n`; every validation runs before any
    /// placeholder is bound.
    pub(crate) fn compile_timeline(
        &self,
        condition: &TimelineCondition,
        param: usize,
    ) -> Result<Fragment, CompileError> {
        if condition.kind.trim().is_empty() {
            return Err(CompileError::structural(
                "contact_timeline condition requires a non-empty `kind`",
            ));
        }
        if condition.count_operator.is_empty() {
            return Err(CompileError::structural(
                "contact_timeline condition requires a `count_operator`",
            ));
        }
        let comparison = CountOperator::parse(&condition.count_operator)?;
        if condition.count_value < 0 {
            return Err(CompileError::domain(
                "count value",
                &condition.count_value.to_string(),
            ));
        }
        let timeframe = Timeframe::parse(
            condition.timeframe_operator.as_deref(),
            &condition.timeframe_values,
        )?;

        let tables = &self.config.tables;
        let mut out = Fragment::empty(param);
        let mut predicates = vec![
            format!("{}.email = {}.email", EVENT_ALIAS, tables.contacts),
            format!("{}.kind = {}", EVENT_ALIAS, out.bind(condition.kind.clone())),
        ];
        if let Some(predicate) = self.timeframe_predicate(&timeframe, &mut out) {
            predicates.push(predicate);
        }

        let metadata = FieldAccess::JsonPath {
            alias: EVENT_ALIAS,
            column: &self.config.metadata_column,
        };
        for filter in &condition.filters {
            let fragment = compile_filter(&self.whitelist, filter, metadata, out.next_param)?;
            if !fragment.is_empty() {
                predicates.push(out.absorb(fragment));
            }
        }

        let count = out.bind(condition.count_value);
        out.sql = format!(
            "(SELECT COUNT(*) FROM {} {} WHERE {}) {} {}",
            tables.contact_timeline,
            EVENT_ALIAS,
            predicates.join(" AND "),
            comparison.sql(),
            count
        );
        trace!(kind = %condition.kind, ?timeframe, "compiled timeline condition");
        Ok(out)
    }

    fn timeframe_predicate(&self, timeframe: &Timeframe, out: &mut Fragment) -> Option<String> {
        let column = format!("{}.created_at", EVENT_ALIAS);
        match timeframe {
            Timeframe::Anytime => None,
            Timeframe::InDateRange(start, end) => {
                let start = out.bind(*start);
                let end = out.bind(*end);
                Some(format!("{} BETWEEN {} AND {}", column, start, end))
            }
            Timeframe::BeforeDate(at) => Some(format!("{} < {}", column, out.bind(*at))),
            Timeframe::AfterDate(at) => Some(format!("{} > {}", column, out.bind(*at))),
            Timeframe::InTheLastDays(days) => match self.config.interval_mode {
                IntervalMode::Literal => {
                    // Interval literals cannot be bound. Only a u32 checked by
                    // parse_days is ever written here.
                    let days: u32 = *days;
                    debug_assert!((1..=MAX_RELATIVE_DAYS).contains(&days));
                    Some(format!("{} > NOW() - INTERVAL '{} days'", column, days))
                }
                IntervalMode::Parameterized => {
                    let days = i32::try_from(*days).unwrap_or(MAX_RELATIVE_DAYS as i32);
                    Some(format!(
                        "{} > NOW() - make_interval(days => {})",
                        column,
                        out.bind(days)
                    ))
                }
            },
        }
    }
}
