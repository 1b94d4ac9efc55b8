//! Row filter expressions of the form `column=op.value`.

use crate::types::Row;
use serde_json::Value;

/// Comparison operator in a filter expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "in" => FilterOp::In,
            _ => return None,
        })
    }
}

/// Parsed filter, e.g. `status=eq.pending` or `id=in.(a,b,c)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterExpr {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

impl FilterExpr {
    /// Parse `column=op.value`. Returns `None` on malformed input.
    pub fn parse(s: &str) -> Option<Self> {
        let (column, rest) = s.split_once('=')?;
        let (op, value) = rest.split_once('.')?;
        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        Some(Self {
            column: column.to_string(),
            op: FilterOp::parse(op.trim())?,
            value: value.to_string(),
        })
    }

    /// Evaluate against a row image. Missing columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(&self.column) else {
            return false;
        };
        let cell = render(cell);

        match self.op {
            FilterOp::Eq => cell == self.value,
            FilterOp::Neq => cell != self.value,
            FilterOp::In => self
                .value
                .trim_start_matches('(')
                .trim_end_matches(')')
                .split(',')
                .any(|v| v.trim() == cell),
            FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
                let ordering = match (cell.parse::<f64>(), self.value.parse::<f64>()) {
                    (Ok(a), Ok(b)) => a.partial_cmp(&b),
                    _ => Some(cell.as_str().cmp(self.value.as_str())),
                };
                let Some(ordering) = ordering else {
                    return false;
                };
                match self.op {
                    FilterOp::Lt => ordering.is_lt(),
                    FilterOp::Lte => ordering.is_le(),
                    FilterOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }
            }
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
