use std::collections::{BTreeMap, HashSet};

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use rusqlite::types::Value;

/// A flat JSON object exactly as the API returned it.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Every field name across `records`, in first-seen order.
pub fn field_union(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Field names as they appear in the API payload and as table columns.
pub const MODIFIED_DATE: &str = "Modified Date";
pub const CREATED_DATE: &str = "Created Date";
pub const CREATED_BY: &str = "Created By";
pub const ESTIMATED_DATE: &str = "estimated_date";
pub const RECIPIENT_REF: &str = "recipient_ref";
pub const STATUS: &str = "status";
pub const AMOUNT: &str = "amount";
pub const YEAR_REF: &str = "year_ref";
pub const PAYMENT_DATE: &str = "payment_date";
pub const TRANSACTION_TYPE: &str = "OS_type-transaction";
pub const USER_REF: &str = "user_ref";
pub const COD_REF: &str = "cod_ref";
pub const MONTH_REF: &str = "month_ref";
pub const FREQUENCY_TYPE: &str = "OS_frequency-type";
pub const ID: &str = "_id";

/// One transaction after normalization. Date fields are parsed timestamps
/// (`None` when missing or unparsable). `amount` is fixed-point with two
/// decimal places and the `*_ref` period fields are integers; a value that
/// does not fit its column is left `None` and recorded in `invalid`. Every
/// other field keeps the scalar the API sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Value,
    pub modified_date: Option<NaiveDateTime>,
    pub created_date: Option<NaiveDateTime>,
    pub created_by: Value,
    pub estimated_date: Option<NaiveDateTime>,
    pub recipient_ref: Value,
    pub status: Value,
    pub amount: Option<BigDecimal>,
    pub year_ref: Option<i64>,
    pub payment_date: Option<NaiveDateTime>,
    pub transaction_type: Value,
    pub user_ref: Value,
    pub cod_ref: Value,
    pub month_ref: Option<i64>,
    pub frequency_type: Value,
    /// Fields outside the known schema, keyed by their raw name.
    pub extra: BTreeMap<String, Value>,
    /// Column name and reason for each value that could not be stored.
    pub invalid: Vec<(String, String)>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            id: Value::Null,
            modified_date: None,
            created_date: None,
            created_by: Value::Null,
            estimated_date: None,
            recipient_ref: Value::Null,
            status: Value::Null,
            amount: None,
            year_ref: None,
            payment_date: None,
            transaction_type: Value::Null,
            user_ref: Value::Null,
            cod_ref: Value::Null,
            month_ref: None,
            frequency_type: Value::Null,
            extra: BTreeMap::new(),
            invalid: Vec::new(),
        }
    }
}

fn timestamp(ts: Option<NaiveDateTime>) -> Value {
    ts.map(|t| Value::Text(t.format(TIMESTAMP_FORMAT).to_string()))
        .unwrap_or(Value::Null)
}

impl Transaction {
    /// The value to bind for `column`; NULL when the record has no such field.
    pub fn value(&self, column: &str) -> Value {
        match column {
            MODIFIED_DATE => timestamp(self.modified_date),
            CREATED_DATE => timestamp(self.created_date),
            CREATED_BY => self.created_by.clone(),
            ESTIMATED_DATE => timestamp(self.estimated_date),
            RECIPIENT_REF => self.recipient_ref.clone(),
            STATUS => self.status.clone(),
            AMOUNT => self
                .amount
                .as_ref()
                .map(|d| Value::Text(d.to_string()))
                .unwrap_or(Value::Null),
            YEAR_REF => self.year_ref.map(Value::Integer).unwrap_or(Value::Null),
            PAYMENT_DATE => timestamp(self.payment_date),
            TRANSACTION_TYPE => self.transaction_type.clone(),
            USER_REF => self.user_ref.clone(),
            COD_REF => self.cod_ref.clone(),
            MONTH_REF => self.month_ref.map(Value::Integer).unwrap_or(Value::Null),
            FREQUENCY_TYPE => self.frequency_type.clone(),
            ID => self.id.clone(),
            other => self.extra.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    /// The first conversion problem among `columns`, formatted for the error
    /// summary.
    pub fn problem(&self, columns: &[String]) -> Option<String> {
        self.invalid
            .iter()
            .find(|(column, _)| columns.contains(column))
            .map(|(column, reason)| format!("{}: `{column}` {reason}", self.label()))
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        match &self.id {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            _ => "<no _id>".to_string(),
        }
    }
}

/// Normalized records plus every field name seen across them, in first-seen
/// order. A field missing from one record is NULL for that record.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub fields: Vec<String>,
    pub transactions: Vec<Transaction>,
}

impl RecordSet {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
