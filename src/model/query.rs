//! Delete-by-query predicates and the predicate evaluator seam.
//!
//! Query parsing and execution belong to the search layer. The store only
//! needs a serialisable predicate it can log and an oracle answering
//! "does document X match predicate P".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Document, DocumentId};

/// A structured predicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// Matches every document.
    All,
    /// Matches documents whose id is listed.
    Ids { ids: Vec<DocumentId> },
    /// Matches documents whose field equals `value` (or contains it, for arrays).
    Term { field: String, value: Value },
    /// Matches numeric fields inside an inclusive range.
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    And { clauses: Vec<Query> },
    Or { clauses: Vec<Query> },
    Not { clause: Box<Query> },
}

impl Query {
    pub fn ids<I, D>(ids: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DocumentId>,
    {
        Query::Ids {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Pure, side-effect-free predicate oracle.
pub trait PredicateEvaluator: Send + Sync {
    fn matches(&self, query: &Query, document: &Document) -> bool;
}

/// Evaluates `Query` directly against document fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldMatcher;

impl PredicateEvaluator for FieldMatcher {
    fn matches(&self, query: &Query, document: &Document) -> bool {
        match query {
            Query::All => true,
            Query::Ids { ids } => ids.iter().any(|id| *id == document.id),
            Query::Term { field, value } => match document.field(field) {
                Some(Value::Array(items)) => items.iter().any(|item| term_eq(item, value)),
                Some(found) => term_eq(&found, value),
                None => false,
            },
            Query::Range { field, min, max } => {
                let Some(n) = document.field(field).as_ref().and_then(as_number) else {
                    return false;
                };
                min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)
            }
            Query::And { clauses } => clauses.iter().all(|q| self.matches(q, document)),
            Query::Or { clauses } => clauses.iter().any(|q| self.matches(q, document)),
            Query::Not { clause } => !self.matches(clause, document),
        }
    }
}

/// Term equality tolerates a string/number mismatch ("5" == 5), since ids and
/// numeric fields are frequently written either way.
fn term_eq(found: &Value, expected: &Value) -> bool {
    if found == expected {
        return true;
    }
    match (found, expected) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
