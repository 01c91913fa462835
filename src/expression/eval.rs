use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::error::EvaluationError;
use crate::frame::ScriptFrame;
use crate::value::{Dictionary, Value};

use super::Expression;

const PATTERN_CACHE_MAX: usize = 1024;

static PATTERN_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

fn cached_wildcard(pattern: &str) -> Result<Regex, EvaluationError> {
    let cache = PATTERN_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(&wildcard_to_regex(pattern)).map_err(|e| {
        EvaluationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        }
    })?;

    // A poisoned cache only costs recompilation.
    if let Ok(mut guard) = cache.write() {
        if guard.len() >= PATTERN_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Ok(compiled)
}

fn index_value(base: &Value, index: &Value) -> Result<Value, EvaluationError> {
    match base {
        Value::Dictionary(dict) => match index {
            Value::String(key) => Ok(dict.get(key).cloned().unwrap_or_default()),
            other => Err(EvaluationError::InvalidIndex {
                index: other.to_string(),
                type_name: base.type_name(),
            }),
        },
        Value::Array(items) => {
            let position = index
                .as_int()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i < items.len());
            match position {
                Some(i) => Ok(items[i].clone()),
                None => Err(EvaluationError::InvalidIndex {
                    index: index.to_string(),
                    type_name: base.type_name(),
                }),
            }
        }
        other => Err(EvaluationError::InvalidIndexer {
            type_name: other.type_name(),
        }),
    }
}

fn add_values(left: Value, right: Value) -> Result<Value, EvaluationError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_add(b)
            .map_or_else(|| Value::Float(a as f64 + b as f64), Value::Int)),
        (l @ (Value::Int(_) | Value::Float(_)), r @ (Value::Int(_) | Value::Float(_))) => {
            Ok(Value::Float(l.as_float().unwrap_or_default() + r.as_float().unwrap_or_default()))
        }
        (l @ Value::String(_), r) | (l, r @ Value::String(_)) => Ok(Value::String(format!("{l}{r}"))),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Dictionary(mut a), Value::Dictionary(b)) => {
            a.extend(b);
            Ok(Value::Dictionary(a))
        }
        (l, r) => Err(EvaluationError::TypeMismatch {
            operator: "+",
            left: l.type_name(),
            right: r.type_name(),
        }),
    }
}

impl Expression {
    /// Evaluates the expression against `frame`.
    ///
    /// # Errors
    /// Returns an [`EvaluationError`] for undefined variables, invalid
    /// indexing, operand type mismatches, assignments without an object in
    /// scope and malformed wildcard patterns.
    pub fn evaluate(&self, frame: &mut ScriptFrame) -> Result<Value, EvaluationError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),

            Self::Variable(name) => frame
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedVariable { name: name.clone() }),

            Self::Indexer { base, index } => {
                let base = base.evaluate(frame)?;
                let index = index.evaluate(frame)?;
                index_value(&base, &index)
            }

            Self::Equal(left, right) => {
                let l = left.evaluate(frame)?;
                let r = right.evaluate(frame)?;
                Ok(Value::Bool(l.loose_eq(&r)))
            }

            Self::NotEqual(left, right) => {
                let l = left.evaluate(frame)?;
                let r = right.evaluate(frame)?;
                Ok(Value::Bool(!l.loose_eq(&r)))
            }

            Self::LogicalAnd(left, right) => {
                if !left.evaluate(frame)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(right.evaluate(frame)?.is_truthy()))
            }

            Self::LogicalOr(left, right) => {
                if left.evaluate(frame)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(right.evaluate(frame)?.is_truthy()))
            }

            Self::LogicalNot(operand) => Ok(Value::Bool(!operand.evaluate(frame)?.is_truthy())),

            Self::In { needle, haystack } => {
                let needle = needle.evaluate(frame)?;
                match haystack.evaluate(frame)? {
                    Value::Array(items) => Ok(Value::Bool(items.iter().any(|v| v.loose_eq(&needle)))),
                    Value::Dictionary(dict) => Ok(Value::Bool(
                        needle.as_str().is_some_and(|key| dict.contains_key(key)),
                    )),
                    Value::Null => Ok(Value::Bool(false)),
                    other => Err(EvaluationError::TypeMismatch {
                        operator: "in",
                        left: needle.type_name(),
                        right: other.type_name(),
                    }),
                }
            }

            Self::Match { pattern, value } => {
                let pattern = pattern.evaluate(frame)?;
                let value = value.evaluate(frame)?;
                let Some(pattern) = pattern.as_str() else {
                    return Err(EvaluationError::TypeMismatch {
                        operator: "match",
                        left: pattern.type_name(),
                        right: value.type_name(),
                    });
                };
                let re = cached_wildcard(pattern)?;
                Ok(Value::Bool(re.is_match(&value.to_string())))
            }

            Self::Add(left, right) => {
                let l = left.evaluate(frame)?;
                let r = right.evaluate(frame)?;
                add_values(l, r)
            }

            Self::Array(items) => items
                .iter()
                .map(|item| item.evaluate(frame))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            Self::Dictionary(entries) => {
                let mut dict = Dictionary::new();
                for (key, expr) in entries {
                    let value = expr.evaluate(frame)?;
                    dict.insert(key.clone(), value);
                }
                Ok(Value::Dictionary(dict))
            }

            Self::Set { field, value } => {
                let value = value.evaluate(frame)?;
                let Some(this) = frame.this.as_mut() else {
                    return Err(EvaluationError::NoObjectInScope { field: field.clone() });
                };
                this.insert(field.clone(), value);
                Ok(Value::Null)
            }

            Self::Block(exprs) => {
                let mut last = Value::Null;
                for expr in exprs {
                    last = expr.evaluate(frame)?;
                }
                Ok(last)
            }
        }
    }
}
