//! Single-field filter compilation, shared by contact filters and timeline
//! metadata filters.

use chrono::{DateTime, NaiveDate, Utc};
use sea_query::Value;

use crate::ast::DimensionFilter;
use crate::error::CompileError;
use crate::sql_compiler::Fragment;
use crate::whitelist::{FieldType, OperatorFamily, Whitelist};

/// How a whitelisted field is addressed in SQL
#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldAccess<'a> {
    /// Column of the outer contacts table; the type may fall back to the
    /// registry declaration.
    Column,
    /// Key inside a JSONB column (`alias.column->>'key'`); the filter must
    /// declare its type.
    JsonPath { alias: &'a str, column: &'a str },
}

/// Compile one filter starting at placeholder `param`.
pub(crate) fn compile_filter(
    whitelist: &Whitelist,
    filter: &DimensionFilter,
    access: FieldAccess<'_>,
    param: usize,
) -> Result<Fragment, CompileError> {
    let field = whitelist.field(&filter.field_name)?;
    let operator = whitelist.operator(&filter.operator)?;
    let mut out = Fragment::empty(param);

    if !operator.requires_value() {
        let supplied = filter.string_values.len() + filter.number_values.len();
        if supplied != 0 {
            return Err(CompileError::arity(
                &filter.field_name,
                &filter.operator,
                0,
                supplied,
            ));
        }
        let expr = field_expr(field.column, access, None);
        out.sql = format!("{} {}", expr, operator.sql);
        return Ok(out);
    }

    let field_type = match (filter.field_type.as_deref(), access) {
        (Some(tag), _) => FieldType::parse(tag).ok_or_else(|| {
            CompileError::type_error(
                &filter.field_name,
                format!("invalid field type `{}`", tag),
            )
        })?,
        (None, FieldAccess::Column) => field.field_type,
        (None, FieldAccess::JsonPath { .. }) => {
            return Err(CompileError::type_error(
                &filter.field_name,
                "field type is required for event metadata filters",
            ))
        }
    };

    if operator.family == OperatorFamily::Pattern && field_type != FieldType::String {
        return Err(CompileError::type_error(
            &filter.field_name,
            format!("operator `{}` requires a string value", filter.operator),
        ));
    }

    let supplied = match field_type {
        FieldType::String | FieldType::Time => filter.string_values.len(),
        FieldType::Number => filter.number_values.len(),
    };
    let expected = operator.family.arity();
    if supplied != expected {
        return Err(CompileError::arity(
            &filter.field_name,
            &filter.operator,
            expected,
            supplied,
        ));
    }

    let values = typed_values(filter, field_type)?;
    let expr = field_expr(field.column, access, Some(field_type));
    let short = || CompileError::arity(&filter.field_name, &filter.operator, expected, supplied);

    out.sql = match operator.family {
        OperatorFamily::Pattern => {
            let raw = filter.string_values.first().ok_or_else(short)?;
            let placeholder = out.bind(format!("%{}%", escape_like_pattern(raw)));
            format!("{} {} {}", expr, operator.sql, placeholder)
        }
        OperatorFamily::Range => {
            let mut values = values.into_iter();
            let (Some(low), Some(high)) = (values.next(), values.next()) else {
                return Err(short());
            };
            let low = out.bind(low);
            let high = out.bind(high);
            format!("{} {} {} AND {}", expr, operator.sql, low, high)
        }
        OperatorFamily::Comparison => {
            let value = values.into_iter().next().ok_or_else(short)?;
            let placeholder = out.bind(value);
            format!("{} {} {}", expr, operator.sql, placeholder)
        }
        OperatorFamily::NullCheck => format!("{} {}", expr, operator.sql),
    };
    Ok(out)
}

fn field_expr(column: &str, access: FieldAccess<'_>, field_type: Option<FieldType>) -> String {
    match access {
        FieldAccess::Column => column.to_string(),
        FieldAccess::JsonPath {
            alias,
            column: json_column,
        } => {
            let path = format!("{}.{}->>'{}'", alias, json_column, column);
            match field_type {
                Some(FieldType::Number) => format!("({})::numeric", path),
                Some(FieldType::Time) => format!("({})::timestamptz", path),
                Some(FieldType::String) | None => path,
            }
        }
    }
}

fn typed_values(filter: &DimensionFilter, field_type: FieldType) -> Result<Vec<Value>, CompileError> {
    match field_type {
        FieldType::String => Ok(filter
            .string_values
            .iter()
            .map(|s| Value::from(s.clone()))
            .collect()),
        FieldType::Number => Ok(filter.number_values.iter().map(|n| Value::from(*n)).collect()),
        FieldType::Time => filter
            .string_values
            .iter()
            .map(|s| parse_time(&filter.field_name, s).map(Value::from))
            .collect(),
    }
}

/// Parses RFC3339, falling back to `YYYY-MM-DD` at midnight UTC.
pub(crate) fn parse_time(field: &str, literal: &str) -> Result<DateTime<Utc>, CompileError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(literal) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(literal, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            CompileError::type_error(field, format!("cannot parse time value `{}`", literal))
        })
}

/// Escape LIKE metacharacters (%, _, \) so `contains` matches literally.
pub(crate) fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WhitelistKind;
    use chrono::TimeZone;

    fn compile(filter: &DimensionFilter) -> Result<Fragment, CompileError> {
        compile_filter(&Whitelist::new(), filter, FieldAccess::Column, 1)
    }

    fn compile_metadata(filter: &DimensionFilter, param: usize) -> Result<Fragment, CompileError> {
        compile_filter(
            &Whitelist::new(),
            filter,
            FieldAccess::JsonPath {
                alias: "e",
                column: "metadata",
            },
            param,
        )
    }

    #[test]
    fn test_contains_wraps_value() {
        let filter = DimensionFilter::new("email", "contains").with_strings(["acme"]);
        let fragment = compile(&filter).unwrap();

        assert_eq!(fragment.sql, "email ILIKE $1");
        assert_eq!(fragment.args, vec![Value::from("%acme%")]);
        assert_eq!(fragment.next_param, 2);
    }

    #[test]
    fn test_not_contains_escapes_metacharacters() {
        let filter = DimensionFilter::new("job_title", "not_contains").with_strings(["100%_"]);
        let fragment = compile(&filter).unwrap();

        assert_eq!(fragment.sql, "job_title NOT ILIKE $1");
        assert_eq!(fragment.args, vec![Value::from(r"%100\%\_%")]);
    }

    #[test]
    fn test_null_check_binds_nothing() {
        let filter = DimensionFilter::new("phone", "is_not_set");
        let fragment = compile_filter(&Whitelist::new(), &filter, FieldAccess::Column, 7).unwrap();

        assert_eq!(fragment.sql, "phone IS NULL");
        assert!(fragment.args.is_empty());
        assert_eq!(fragment.next_param, 7);
    }

    #[test]
    fn test_null_check_rejects_values() {
        let filter = DimensionFilter::new("phone", "is_set").with_strings(["x", "y"]);
        assert_eq!(
            compile(&filter).unwrap_err(),
            CompileError::arity("phone", "is_set", 0, 2)
        );

        let filter = DimensionFilter::new("lifetime_value", "is_not_set").with_numbers([1.0]);
        assert_eq!(
            compile(&filter).unwrap_err(),
            CompileError::arity("lifetime_value", "is_not_set", 0, 1)
        );
    }

    #[test]
    fn test_number_uses_declared_type() {
        let filter = DimensionFilter::new("lifetime_value", "gte").with_numbers([99.5]);
        let fragment = compile_filter(&Whitelist::new(), &filter, FieldAccess::Column, 3).unwrap();

        assert_eq!(fragment.sql, "lifetime_value >= $3");
        assert_eq!(fragment.args, vec![Value::from(99.5f64)]);
        assert_eq!(fragment.next_param, 4);
    }

    #[test]
    fn test_empty_number_values_is_arity_error() {
        let filter = DimensionFilter::new("orders_count", "gt").with_numbers([]);
        let err = compile(&filter).unwrap_err();

        assert_eq!(err, CompileError::arity("orders_count", "gt", 1, 0));
        assert!(err.to_string().contains("orders_count"));
    }

    #[test]
    fn test_date_range_binds_two_timestamps() {
        let filter = DimensionFilter::new("created_at", "in_date_range")
            .with_strings(["2024-01-01", "2024-02-01T12:30:00+02:00"]);
        let fragment = compile(&filter).unwrap();

        assert_eq!(fragment.sql, "created_at BETWEEN $1 AND $2");
        assert_eq!(
            fragment.args,
            vec![
                Value::from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                Value::from(Utc.with_ymd_and_hms(2024, 2, 1, 10, 30, 0).unwrap()),
            ]
        );
    }

    #[test]
    fn test_range_requires_two_values() {
        let filter = DimensionFilter::new("created_at", "not_in_date_range").with_strings(["2024-01-01"]);
        assert_eq!(
            compile(&filter).unwrap_err(),
            CompileError::arity("created_at", "not_in_date_range", 2, 1)
        );
    }

    #[test]
    fn test_comparison_rejects_extra_values() {
        let filter = DimensionFilter::new("country", "equals").with_strings(["FR", "DE"]);
        assert_eq!(
            compile(&filter).unwrap_err(),
            CompileError::arity("country", "equals", 1, 2)
        );
    }

    #[test]
    fn test_unparseable_time_names_literal() {
        let filter = DimensionFilter::new("last_order_at", "lt").with_strings(["yesterday"]);
        match compile(&filter) {
            Err(CompileError::Type { field, message }) => {
                assert_eq!(field, "last_order_at");
                assert!(message.contains("yesterday"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_contains_on_number_is_type_error() {
        let filter = DimensionFilter::new("lifetime_value", "contains").with_numbers([1.0]);
        assert!(matches!(compile(&filter), Err(CompileError::Type { .. })));
    }

    #[test]
    fn test_invalid_type_tag() {
        let filter = DimensionFilter::new("country", "equals")
            .with_type("boolean")
            .with_strings(["true"]);
        match compile(&filter) {
            Err(CompileError::Type { message, .. }) => assert!(message.contains("boolean")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_explicit_type_overrides_registry() {
        let filter = DimensionFilter::new("custom_string_1", "gt")
            .with_type("number")
            .with_numbers([10.0]);
        let fragment = compile(&filter).unwrap();
        assert_eq!(fragment.args, vec![Value::from(10.0f64)]);
    }

    #[test]
    fn test_unknown_operator() {
        let filter = DimensionFilter::new("email", "matches").with_strings(["a"]);
        assert_eq!(
            compile(&filter).unwrap_err(),
            CompileError::WhitelistViolation {
                kind: WhitelistKind::Operator,
                name: "matches".to_string()
            }
        );
    }

    #[test]
    fn test_metadata_number_is_cast() {
        let filter = DimensionFilter::new("lifetime_value", "gt")
            .with_type("number")
            .with_numbers([50.0]);
        let fragment = compile_metadata(&filter, 2).unwrap();

        assert_eq!(fragment.sql, "(e.metadata->>'lifetime_value')::numeric > $2");
    }

    #[test]
    fn test_metadata_time_and_string_paths() {
        let filter = DimensionFilter::new("last_order_at", "gte")
            .with_type("time")
            .with_strings(["2024-03-01"]);
        assert_eq!(
            compile_metadata(&filter, 1).unwrap().sql,
            "(e.metadata->>'last_order_at')::timestamptz >= $1"
        );

        let filter = DimensionFilter::new("country", "contains")
            .with_type("string")
            .with_strings(["land"]);
        assert_eq!(
            compile_metadata(&filter, 4).unwrap().sql,
            "e.metadata->>'country' ILIKE $4"
        );
    }

    #[test]
    fn test_metadata_requires_type() {
        let filter = DimensionFilter::new("country", "equals").with_strings(["FR"]);
        assert!(matches!(
            compile_metadata(&filter, 1),
            Err(CompileError::Type { .. })
        ));
    }

    #[test]
    fn test_metadata_null_check_needs_no_type() {
        let filter = DimensionFilter::new("country", "is_set");
        assert_eq!(
            compile_metadata(&filter, 1).unwrap().sql,
            "e.metadata->>'country' IS NOT NULL"
        );
    }

    #[test]
    fn test_escape_like_pattern() {
        assert_eq!(escape_like_pattern("hello"), "hello");
        assert_eq!(escape_like_pattern("100%_\\test"), "100\\%\\_\\\\test");
    }
}
