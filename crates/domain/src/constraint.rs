//! Constraint expressions attached to permissions and role grants.
//!
//! A constraint set maps a context key to the operators its value must
//! satisfy. The JSON shape accepted at the edges is:
//!
//! - a literal (`{"region": "east"}`) for equality,
//! - an array (`{"tier": ["gold", "silver"]}`) for membership,
//! - an operator object (`{"amount": {"$gte": 10, "$lte": 1000}}`) using
//!   `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`.
//!
//! All operators of a key and all keys of a set must pass. An empty set
//! always passes.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use gatehouse_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One comparison applied to a context value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintOperator {
    /// Context value equals the operand.
    Eq(Value),
    /// Context value differs from the operand.
    Ne(Value),
    /// Context value is greater than the operand.
    Gt(Value),
    /// Context value is greater than or equal to the operand.
    Gte(Value),
    /// Context value is less than the operand.
    Lt(Value),
    /// Context value is less than or equal to the operand.
    Lte(Value),
    /// Context value is one of the operands (`$in`).
    In(Vec<Value>),
    /// Context value is none of the operands (`$nin`).
    Nin(Vec<Value>),
    /// Context value is one of the operands (array shorthand).
    OneOf(Vec<Value>),
}

impl ConstraintOperator {
    /// Returns whether the context value satisfies this operator.
    #[must_use]
    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Eq(expected) => values_equal(actual, expected),
            Self::Ne(expected) => !values_equal(actual, expected),
            Self::Gt(bound) => compare_values(actual, bound) == Some(Ordering::Greater),
            Self::Gte(bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt(bound) => compare_values(actual, bound) == Some(Ordering::Less),
            Self::Lte(bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In(candidates) | Self::OneOf(candidates) => candidates
                .iter()
                .any(|candidate| values_equal(actual, candidate)),
            Self::Nin(candidates) => !candidates
                .iter()
                .any(|candidate| values_equal(actual, candidate)),
        }
    }

    fn operator_key(&self) -> &'static str {
        match self {
            Self::Eq(_) => "$eq",
            Self::Ne(_) => "$ne",
            Self::Gt(_) => "$gt",
            Self::Gte(_) => "$gte",
            Self::Lt(_) => "$lt",
            Self::Lte(_) => "$lte",
            Self::In(_) | Self::OneOf(_) => "$in",
            Self::Nin(_) => "$nin",
        }
    }

    fn operand(&self) -> Value {
        match self {
            Self::Eq(value)
            | Self::Ne(value)
            | Self::Gt(value)
            | Self::Gte(value)
            | Self::Lt(value)
            | Self::Lte(value) => value.clone(),
            Self::In(values) | Self::Nin(values) | Self::OneOf(values) => {
                Value::Array(values.clone())
            }
        }
    }

    fn parse(key: &str, operator: &str, operand: &Value) -> AppResult<Self> {
        let list = |name: &str| match operand {
            Value::Array(values) => Ok(values.clone()),
            _ => Err(AppError::Validation(format!(
                "constraint '{key}' operator '{name}' requires an array operand"
            ))),
        };

        match operator {
            "$eq" => Ok(Self::Eq(operand.clone())),
            "$ne" => Ok(Self::Ne(operand.clone())),
            "$gt" => Ok(Self::Gt(operand.clone())),
            "$gte" => Ok(Self::Gte(operand.clone())),
            "$lt" => Ok(Self::Lt(operand.clone())),
            "$lte" => Ok(Self::Lte(operand.clone())),
            "$in" => list(operator).map(Self::In),
            "$nin" => list(operator).map(Self::Nin),
            other => Err(AppError::Validation(format!(
                "constraint '{key}' uses unsupported operator '{other}'"
            ))),
        }
    }
}

/// Behaviour when a constrained key is absent from the request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingContextKeyPolicy {
    /// Absent keys are treated as satisfied.
    #[default]
    Skip,
    /// Absent keys fail the constraint set.
    Deny,
}

impl MissingContextKeyPolicy {
    /// Returns a stable configuration value for this policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Deny => "deny",
        }
    }
}

impl FromStr for MissingContextKeyPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "deny" => Ok(Self::Deny),
            other => Err(AppError::Validation(format!(
                "missing context key policy must be 'skip' or 'deny', got '{other}'"
            ))),
        }
    }
}

/// Outcome of evaluating a constraint set against a context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConstraintEvaluation {
    /// Whether every constrained key passed.
    pub satisfied: bool,
    /// Keys absent from the context that were treated as satisfied.
    pub skipped_keys: Vec<String>,
    /// First key that failed, if any.
    pub failed_key: Option<String>,
}

/// Conjunction of per-key operator lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ConstraintSet {
    rules: BTreeMap<String, Vec<ConstraintOperator>>,
}

impl ConstraintSet {
    /// Returns an empty constraint set that always passes.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Parses a constraint set from its JSON representation.
    ///
    /// `null` parses to the empty set.
    pub fn from_json(value: &Value) -> AppResult<Self> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            _ => {
                return Err(AppError::Validation(
                    "constraints must be a JSON object".to_owned(),
                ));
            }
        };

        let mut rules = BTreeMap::new();
        for (key, rule) in object {
            if key.trim().is_empty() {
                return Err(AppError::Validation(
                    "constraint keys must not be empty".to_owned(),
                ));
            }

            rules.insert(key.clone(), parse_rule(key, rule)?);
        }

        Ok(Self { rules })
    }

    /// Returns the JSON representation of this set.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .rules
            .iter()
            .map(|(key, operators)| (key.clone(), render_rule(operators)))
            .collect();

        Value::Object(object)
    }

    /// Adds an operator for a context key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, operator: ConstraintOperator) -> Self {
        self.rules.entry(key.into()).or_default().push(operator);
        self
    }

    /// Returns whether the set has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the constrained context keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Evaluates the set against context attributes.
    #[must_use]
    pub fn evaluate(
        &self,
        attributes: &Map<String, Value>,
        missing_key_policy: MissingContextKeyPolicy,
    ) -> ConstraintEvaluation {
        let mut evaluation = ConstraintEvaluation {
            satisfied: true,
            ..ConstraintEvaluation::default()
        };

        for (key, operators) in &self.rules {
            let Some(actual) = attributes.get(key) else {
                match missing_key_policy {
                    MissingContextKeyPolicy::Skip => {
                        evaluation.skipped_keys.push(key.clone());
                        continue;
                    }
                    MissingContextKeyPolicy::Deny => {
                        evaluation.satisfied = false;
                        evaluation.failed_key = Some(key.clone());
                        return evaluation;
                    }
                }
            };

            if !operators.iter().all(|operator| operator.matches(actual)) {
                evaluation.satisfied = false;
                evaluation.failed_key = Some(key.clone());
                return evaluation;
            }
        }

        evaluation
    }
}

impl TryFrom<Value> for ConstraintSet {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl From<ConstraintSet> for Value {
    fn from(value: ConstraintSet) -> Self {
        value.to_json()
    }
}

fn parse_rule(key: &str, rule: &Value) -> AppResult<Vec<ConstraintOperator>> {
    match rule {
        Value::Array(values) => Ok(vec![ConstraintOperator::OneOf(values.clone())]),
        Value::Object(operators)
            if !operators.is_empty() && operators.keys().all(|name| name.starts_with('$')) =>
        {
            operators
                .iter()
                .map(|(operator, operand)| ConstraintOperator::parse(key, operator, operand))
                .collect()
        }
        literal => Ok(vec![ConstraintOperator::Eq(literal.clone())]),
    }
}

fn render_rule(operators: &[ConstraintOperator]) -> Value {
    match operators {
        [ConstraintOperator::Eq(value)] if !value.is_array() && !value.is_object() => {
            value.clone()
        }
        [ConstraintOperator::OneOf(values)] => Value::Array(values.clone()),
        _ => Value::Object(
            operators
                .iter()
                .map(|operator| (operator.operator_key().to_owned(), operator.operand()))
                .collect(),
        ),
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match compare_values(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}
