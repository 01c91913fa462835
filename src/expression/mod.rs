//! Expression trees consumed by apply rules.
//!
//! The tree is a closed enum: evaluation and the static analysis used for
//! targeted rules (see [`crate::apply::targeted`]) are both plain structural
//! matches over its variants.

mod eval;

use crate::value::Value;

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant value.
    Literal(Value),
    /// A variable reference, resolved against the frame.
    Variable(String),
    /// `base[index]`, also used for `base.index`.
    Indexer {
        /// Indexed value.
        base: Box<Expression>,
        /// Key or position.
        index: Box<Expression>,
    },
    /// `left == right`.
    Equal(Box<Expression>, Box<Expression>),
    /// `left != right`.
    NotEqual(Box<Expression>, Box<Expression>),
    /// `left && right`.
    LogicalAnd(Box<Expression>, Box<Expression>),
    /// `left || right`.
    LogicalOr(Box<Expression>, Box<Expression>),
    /// `!operand`.
    LogicalNot(Box<Expression>),
    /// `needle in haystack`, for arrays (element) and dictionaries (key).
    In {
        /// Searched value.
        needle: Box<Expression>,
        /// Array or dictionary.
        haystack: Box<Expression>,
    },
    /// `match(pattern, value)` with `*` and `?` wildcards.
    Match {
        /// Wildcard pattern.
        pattern: Box<Expression>,
        /// Tested value.
        value: Box<Expression>,
    },
    /// `left + right`: numeric addition, string concatenation, array
    /// concatenation or dictionary merge.
    Add(Box<Expression>, Box<Expression>),
    /// `[a, b, ...]`.
    Array(Vec<Expression>),
    /// `{ key = value, ... }`.
    Dictionary(Vec<(String, Expression)>),
    /// `field = value` on the object under construction.
    Set {
        /// Target field.
        field: String,
        /// Assigned value.
        value: Box<Expression>,
    },
    /// Sequence of expressions, evaluating to the last one.
    Block(Vec<Expression>),
}

impl Expression {
    /// Literal value.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Variable reference.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// `base[index]`.
    #[must_use]
    pub fn index(base: Self, index: Self) -> Self {
        Self::Indexer {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// `object.field`, sugar for indexing with a string literal.
    #[must_use]
    pub fn field(object: &str, field: &str) -> Self {
        Self::index(Self::var(object), Self::literal(field))
    }

    /// `left == right`.
    #[must_use]
    pub fn eq(left: Self, right: Self) -> Self {
        Self::Equal(Box::new(left), Box::new(right))
    }

    /// `left != right`.
    #[must_use]
    pub fn ne(left: Self, right: Self) -> Self {
        Self::NotEqual(Box::new(left), Box::new(right))
    }

    /// `left && right`.
    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::LogicalAnd(Box::new(left), Box::new(right))
    }

    /// `left || right`.
    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::LogicalOr(Box::new(left), Box::new(right))
    }

    /// `!operand`.
    #[must_use]
    pub fn not(operand: Self) -> Self {
        Self::LogicalNot(Box::new(operand))
    }

    /// `needle in haystack`.
    #[must_use]
    pub fn contains(needle: Self, haystack: Self) -> Self {
        Self::In {
            needle: Box::new(needle),
            haystack: Box::new(haystack),
        }
    }

    /// `match(pattern, value)` with `*` and `?` wildcards.
    #[must_use]
    pub fn matches(pattern: impl Into<String>, value: Self) -> Self {
        Self::Match {
            pattern: Box::new(Self::literal(pattern.into())),
            value: Box::new(value),
        }
    }

    /// `left + right`.
    #[must_use]
    pub fn add(left: Self, right: Self) -> Self {
        Self::Add(Box::new(left), Box::new(right))
    }

    /// `field = value`.
    #[must_use]
    pub fn set(field: impl Into<String>, value: Self) -> Self {
        Self::Set {
            field: field.into(),
            value: Box::new(value),
        }
    }

    /// `field = "<literal>"`, the shape used for injected relationship keys.
    #[must_use]
    pub fn set_literal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::set(field, Self::literal(value))
    }

    /// `host.name == "<name>"`.
    #[must_use]
    pub fn host_name_is(name: &str) -> Self {
        Self::eq(Self::field("host", "name"), Self::literal(name))
    }

    /// `service.name == "<name>"`.
    #[must_use]
    pub fn service_name_is(name: &str) -> Self {
        Self::eq(Self::field("service", "name"), Self::literal(name))
    }
}
