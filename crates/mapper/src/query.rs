//! Query criteria.
//!
//! A [`Query`] is a conjunction of conditions. Data sources may translate it to
//! their own query language or evaluate it in memory with [`Query::matches`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use docmap_core::{Attributes, RecordId, Reference, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Attribute equals any element of an array operand.
    In,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Id(RecordId),
    Attribute {
        name: String,
        operator: Operator,
        value: Value,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: RecordId) -> Self {
        Self {
            conditions: vec![Condition::Id(id)],
        }
    }

    pub fn filter(mut self, name: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Attribute {
            name: name.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(name, Operator::Eq, value)
    }

    pub fn ne(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(name, Operator::Ne, value)
    }

    pub fn lt(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(name, Operator::Lt, value)
    }

    pub fn lte(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(name, Operator::Lte, value)
    }

    pub fn gt(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(name, Operator::Gt, value)
    }

    pub fn gte(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(name, Operator::Gte, value)
    }

    pub fn within(self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(name, Operator::In, Value::Array(values))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_all(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Replace persisted entities in operands with their references, so a
    /// query like `author == user` matches what is actually stored.
    pub fn with_references(self) -> Self {
        let conditions = self
            .conditions
            .into_iter()
            .map(|condition| match condition {
                Condition::Attribute {
                    name,
                    operator,
                    value,
                } => Condition::Attribute {
                    name,
                    operator,
                    value: referenced(value),
                },
                other => other,
            })
            .collect();
        Self { conditions }
    }

    /// Evaluate the criteria against a stored record.
    ///
    /// Missing attributes read as `Null`. Ordering operators only match
    /// values of comparable kinds (numbers, strings, booleans).
    pub fn matches(&self, id: &RecordId, attributes: &Attributes) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Id(wanted) => wanted == id,
            Condition::Attribute {
                name,
                operator,
                value,
            } => {
                let actual = attributes.get(name).unwrap_or(&Value::Null);
                evaluate(actual, *operator, value)
            }
        })
    }
}

fn referenced(value: Value) -> Value {
    match value {
        Value::Entity(entity) => match entity.id() {
            Some(id) => Value::Reference(Reference::new(entity.class(), id)),
            None => Value::Entity(entity),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(referenced).collect()),
        other => other,
    }
}

fn evaluate(actual: &Value, operator: Operator, operand: &Value) -> bool {
    match operator {
        Operator::Eq => loosely_equal(actual, operand),
        Operator::Ne => !loosely_equal(actual, operand),
        Operator::In => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| loosely_equal(actual, item))),
        Operator::Lt => ordering(actual, operand) == Some(Ordering::Less),
        Operator::Lte => matches!(ordering(actual, operand), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => ordering(actual, operand) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            ordering(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || (a.as_f64().is_some() && ordering(a, b) == Some(Ordering::Equal))
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}
