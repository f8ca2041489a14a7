//! Field and operator registry.
//!
//! These tables are the only source of identifiers and operator text that may
//! be written into generated SQL. Caller input is looked up here and never
//! interpolated directly.

use std::collections::HashMap;

use crate::error::{CompileError, WhitelistKind};

/// Value type of a filterable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Time,
}

impl FieldType {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "time" => Some(FieldType::Time),
            _ => None,
        }
    }
}

/// Operator families, which fix how many values an operator consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorFamily {
    Comparison,
    Pattern,
    NullCheck,
    Range,
}

impl OperatorFamily {
    pub fn arity(&self) -> usize {
        match self {
            OperatorFamily::NullCheck => 0,
            OperatorFamily::Comparison | OperatorFamily::Pattern => 1,
            OperatorFamily::Range => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub column: &'static str,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorSpec {
    pub sql: &'static str,
    pub family: OperatorFamily,
}

impl OperatorSpec {
    pub fn requires_value(&self) -> bool {
        self.family != OperatorFamily::NullCheck
    }
}

const FIELDS: &[(&str, FieldType)] = &[
    ("email", FieldType::String),
    ("external_id", FieldType::String),
    ("timezone", FieldType::String),
    ("language", FieldType::String),
    ("first_name", FieldType::String),
    ("last_name", FieldType::String),
    ("phone", FieldType::String),
    ("address_line_1", FieldType::String),
    ("address_line_2", FieldType::String),
    ("country", FieldType::String),
    ("postcode", FieldType::String),
    ("state", FieldType::String),
    ("job_title", FieldType::String),
    ("lifetime_value", FieldType::Number),
    ("orders_count", FieldType::Number),
    ("last_order_at", FieldType::Time),
    ("custom_string_1", FieldType::String),
    ("custom_string_2", FieldType::String),
    ("custom_string_3", FieldType::String),
    ("custom_string_4", FieldType::String),
    ("custom_string_5", FieldType::String),
    ("custom_number_1", FieldType::Number),
    ("custom_number_2", FieldType::Number),
    ("custom_number_3", FieldType::Number),
    ("custom_number_4", FieldType::Number),
    ("custom_number_5", FieldType::Number),
    ("custom_datetime_1", FieldType::Time),
    ("custom_datetime_2", FieldType::Time),
    ("custom_datetime_3", FieldType::Time),
    ("custom_datetime_4", FieldType::Time),
    ("custom_datetime_5", FieldType::Time),
    ("created_at", FieldType::Time),
    ("updated_at", FieldType::Time),
];

const OPERATORS: &[(&str, &str, OperatorFamily)] = &[
    ("equals", "=", OperatorFamily::Comparison),
    ("not_equals", "!=", OperatorFamily::Comparison),
    ("gt", ">", OperatorFamily::Comparison),
    ("gte", ">=", OperatorFamily::Comparison),
    ("lt", "<", OperatorFamily::Comparison),
    ("lte", "<=", OperatorFamily::Comparison),
    ("contains", "ILIKE", OperatorFamily::Pattern),
    ("not_contains", "NOT ILIKE", OperatorFamily::Pattern),
    ("is_set", "IS NOT NULL", OperatorFamily::NullCheck),
    ("is_not_set", "IS NULL", OperatorFamily::NullCheck),
    ("in_date_range", "BETWEEN", OperatorFamily::Range),
    ("not_in_date_range", "NOT BETWEEN", OperatorFamily::Range),
];

/// Immutable lookup tables, built once per compiler
#[derive(Debug, Clone)]
pub struct Whitelist {
    fields: HashMap<&'static str, FieldSpec>,
    operators: HashMap<&'static str, OperatorSpec>,
}

impl Whitelist {
    pub fn new() -> Self {
        let fields = FIELDS
            .iter()
            .map(|&(name, field_type)| {
                (
                    name,
                    FieldSpec {
                        column: name,
                        field_type,
                    },
                )
            })
            .collect();
        let operators = OPERATORS
            .iter()
            .map(|&(name, sql, family)| (name, OperatorSpec { sql, family }))
            .collect();
        Self { fields, operators }
    }

    pub fn field(&self, name: &str) -> Result<&FieldSpec, CompileError> {
        self.fields
            .get(name)
            .ok_or_else(|| CompileError::not_allowed(WhitelistKind::Field, name))
    }

    pub fn operator(&self, name: &str) -> Result<&OperatorSpec, CompileError> {
        self.operators
            .get(name)
            .ok_or_else(|| CompileError::not_allowed(WhitelistKind::Operator, name))
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new()
    }
}
