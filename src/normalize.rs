use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use serde_json::Value as Json;

use crate::models::{self, Record, RecordSet, Transaction};

/// Fields holding dates; these are the only fields that get coerced.
pub const DATE_FIELDS: [&str; 4] = [
    models::MODIFIED_DATE,
    models::CREATED_DATE,
    models::ESTIMATED_DATE,
    models::PAYMENT_DATE,
];

/// Parse a raw date value. Unparsable input is `None`, never an error.
pub fn parse_timestamp(raw: &Json) -> Option<NaiveDateTime> {
    match raw {
        Json::String(s) => parse_timestamp_str(s),
        // Integer timestamps are epoch milliseconds.
        Json::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
        }
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// DECIMAL(10, 2) holds magnitudes below 10^8.
const AMOUNT_LIMIT: i64 = 100_000_000;

/// Parse a money amount, rounded half away from zero to two decimal places.
/// Null and blank strings are `Ok(None)`; anything that is not a number or
/// does not fit DECIMAL(10, 2) is an `Err` with the reason.
pub fn parse_amount(raw: &Json) -> Result<Option<BigDecimal>, String> {
    let parsed = match raw {
        Json::Null => return Ok(None),
        Json::String(s) if s.trim().is_empty() => return Ok(None),
        Json::String(s) => BigDecimal::from_str(s.trim()),
        Json::Number(n) => BigDecimal::from_str(&n.to_string()),
        Json::Bool(b) => Ok(BigDecimal::from(i64::from(*b))),
        other => return Err(format!("is not a decimal number: {other}")),
    };
    let value = parsed.map_err(|_| format!("is not a decimal number: {raw}"))?;
    let rounded = value.with_scale_round(2, RoundingMode::HalfUp);
    if rounded.abs() >= BigDecimal::from(AMOUNT_LIMIT) {
        return Err(format!("is out of range for DECIMAL(10, 2): {rounded}"));
    }
    Ok(Some(rounded))
}

fn round_to_i64(f: f64) -> Option<i64> {
    let r = f.round();
    (r.is_finite() && r >= i64::MIN as f64 && r < i64::MAX as f64).then_some(r as i64)
}

/// Parse an integer column value. Fractional numbers round to the nearest
/// integer; numeric strings are accepted.
pub fn parse_integer(raw: &Json) -> Result<Option<i64>, String> {
    let parsed = match raw {
        Json::Null => return Ok(None),
        Json::String(s) if s.trim().is_empty() => return Ok(None),
        Json::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(round_to_i64))
        }
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(round_to_i64)),
        Json::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| format!("is not an integer: {raw}"))
}

/// Convert a JSON scalar to the SQL value bound for it. Nested values are
/// stored as their JSON text.
pub fn to_sql_value(raw: &Json) -> Value {
    match raw {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Integer(*b as i64),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Real).unwrap_or(Value::Null),
        },
        Json::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn take_value(record: &mut Record, key: &str) -> Value {
    record.remove(key).as_ref().map(to_sql_value).unwrap_or(Value::Null)
}

fn take_timestamp(record: &mut Record, key: &str) -> Option<NaiveDateTime> {
    record.remove(key).as_ref().and_then(parse_timestamp)
}

fn take_checked<T>(
    record: &mut Record,
    key: &str,
    parse: fn(&Json) -> Result<Option<T>, String>,
    invalid: &mut Vec<(String, String)>,
) -> Option<T> {
    match record.remove(key).as_ref().map(parse) {
        None => None,
        Some(Ok(value)) => value,
        Some(Err(reason)) => {
            invalid.push((key.to_string(), reason));
            None
        }
    }
}

pub fn to_transaction(mut record: Record) -> Transaction {
    let mut invalid = Vec::new();
    let amount = take_checked(&mut record, models::AMOUNT, parse_amount, &mut invalid);
    let year_ref = take_checked(&mut record, models::YEAR_REF, parse_integer, &mut invalid);
    let month_ref = take_checked(&mut record, models::MONTH_REF, parse_integer, &mut invalid);
    let mut txn = Transaction {
        id: take_value(&mut record, models::ID),
        modified_date: take_timestamp(&mut record, models::MODIFIED_DATE),
        created_date: take_timestamp(&mut record, models::CREATED_DATE),
        created_by: take_value(&mut record, models::CREATED_BY),
        estimated_date: take_timestamp(&mut record, models::ESTIMATED_DATE),
        recipient_ref: take_value(&mut record, models::RECIPIENT_REF),
        status: take_value(&mut record, models::STATUS),
        amount,
        year_ref,
        payment_date: take_timestamp(&mut record, models::PAYMENT_DATE),
        transaction_type: take_value(&mut record, models::TRANSACTION_TYPE),
        user_ref: take_value(&mut record, models::USER_REF),
        cod_ref: take_value(&mut record, models::COD_REF),
        month_ref,
        frequency_type: take_value(&mut record, models::FREQUENCY_TYPE),
        invalid,
        ..Transaction::default()
    };
    txn.extra = record.iter().map(|(k, v)| (k.clone(), to_sql_value(v))).collect();
    txn
}

/// Turn fetched records into typed transactions, coercing the date fields.
pub fn normalize(records: Vec<Record>) -> RecordSet {
    let fields = models::field_union(&records);
    let transactions: Vec<Transaction> = records.into_iter().map(to_transaction).collect();

    let missing_dates: usize = transactions
        .iter()
        .map(|t| {
            [t.modified_date, t.created_date, t.estimated_date, t.payment_date]
                .iter()
                .filter(|d| d.is_none())
                .count()
        })
        .sum();
    let invalid_records = transactions.iter().filter(|t| !t.invalid.is_empty()).count();
    tracing::debug!(
        records = transactions.len(),
        date_fields = ?DATE_FIELDS,
        missing_dates,
        invalid_records,
        "normalized records"
    );

    RecordSet { fields, transactions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Json) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp(&json!("2023-01-01T00:00:00Z")), Some(ts("2023-01-01 00:00:00")));
        assert_eq!(
            parse_timestamp(&json!("2023-03-05T14:30:15.250Z")),
            Some(ts("2023-03-05 14:30:15") + chrono::Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp(&json!("2023-03-05 14:30:15")), Some(ts("2023-03-05 14:30:15")));
        assert_eq!(parse_timestamp(&json!("2023-03-05T14:30:15")), Some(ts("2023-03-05 14:30:15")));
        assert_eq!(parse_timestamp(&json!("2023-03-05")), Some(ts("2023-03-05 00:00:00")));
        assert_eq!(parse_timestamp(&json!(1672531200000i64)), Some(ts("2023-01-01 00:00:00")));
    }

    #[test]
    fn test_offset_keeps_wall_clock_time() {
        assert_eq!(
            parse_timestamp(&json!("2023-06-01T09:15:00-03:00")),
            Some(ts("2023-06-01 09:15:00"))
        );
    }

    #[test]
    fn test_unparsable_dates_become_missing() {
        assert_eq!(parse_timestamp(&json!("not a date")), None);
        assert_eq!(parse_timestamp(&json!("")), None);
        assert_eq!(parse_timestamp(&json!("2023-13-45")), None);
        assert_eq!(parse_timestamp(&Json::Null), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
        assert_eq!(parse_timestamp(&json!({"date": "2023-01-01"})), None);
    }

    #[test]
    fn test_to_sql_value() {
        assert_eq!(to_sql_value(&json!(10.5)), Value::Real(10.5));
        assert_eq!(to_sql_value(&json!(2023)), Value::Integer(2023));
        assert_eq!(to_sql_value(&json!("paid")), Value::Text("paid".into()));
        assert_eq!(to_sql_value(&json!(false)), Value::Integer(0));
        assert_eq!(to_sql_value(&Json::Null), Value::Null);
        assert_eq!(to_sql_value(&json!(["a", "b"])), Value::Text(r#"["a","b"]"#.into()));
    }

    #[test]
    fn test_transaction_binds_formatted_dates() {
        let txn = to_transaction(record(json!({
            "_id": "a1",
            "amount": 10.5,
            "Modified Date": "2023-01-01T00:00:00Z",
            "payment_date": "garbage",
            "notes": "kept aside",
        })));
        assert_eq!(txn.value("_id"), Value::Text("a1".into()));
        assert_eq!(txn.value("Modified Date"), Value::Text("2023-01-01 00:00:00".into()));
        assert_eq!(txn.value("payment_date"), Value::Null);
        assert_eq!(txn.value("Created Date"), Value::Null);
        assert_eq!(txn.value("amount"), Value::Text("10.50".into()));
        assert_eq!(txn.value("notes"), Value::Text("kept aside".into()));
        assert_eq!(txn.value("unknown"), Value::Null);
        assert_eq!(txn.label(), "a1");
    }

    #[test]
    fn test_normalize_collects_field_union_in_first_seen_order() {
        let set = normalize(vec![
            record(json!({"_id": "a1", "amount": 1.0})),
            record(json!({"_id": "a2", "status": "paid"})),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.fields, vec!["_id", "amount", "status"]);
        assert_eq!(set.transactions[0].status, Value::Null);
        assert_eq!(set.transactions[1].amount, None);
    }

    fn amount(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount_rounds_to_cents() {
        assert_eq!(parse_amount(&json!(10.555)), Ok(Some(amount("10.56"))));
        assert_eq!(parse_amount(&json!(-10.555)), Ok(Some(amount("-10.56"))));
        assert_eq!(parse_amount(&json!(10.545)), Ok(Some(amount("10.55"))));
        assert_eq!(parse_amount(&json!(20)), Ok(Some(amount("20.00"))));
        assert_eq!(parse_amount(&json!(" 99.9 ")), Ok(Some(amount("99.90"))));
        assert_eq!(parse_amount(&json!(99999999.99)), Ok(Some(amount("99999999.99"))));
        assert_eq!(parse_amount(&Json::Null), Ok(None));
        assert_eq!(parse_amount(&json!("")), Ok(None));
    }

    #[test]
    fn test_parse_amount_rejects_non_numbers_and_overflow() {
        assert!(parse_amount(&json!("not money")).is_err());
        assert!(parse_amount(&json!([1])).is_err());
        assert!(parse_amount(&json!(123456789012.345)).unwrap_err().contains("out of range"));
        assert!(parse_amount(&json!(99999999.995)).is_err());
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(&json!(2024)), Ok(Some(2024)));
        assert_eq!(parse_integer(&json!("2024")), Ok(Some(2024)));
        assert_eq!(parse_integer(&json!(3.0)), Ok(Some(3)));
        assert_eq!(parse_integer(&json!(2.5)), Ok(Some(3)));
        assert_eq!(parse_integer(&Json::Null), Ok(None));
        assert!(parse_integer(&json!("abc")).is_err());
        assert!(parse_integer(&json!({"y": 1})).is_err());
        assert!(parse_integer(&json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_unconvertible_values_are_recorded() {
        let txn = to_transaction(record(json!({
            "_id": "p1",
            "amount": "not money",
            "year_ref": "abc",
            "month_ref": 4
        })));
        assert_eq!(txn.amount, None);
        assert_eq!(txn.year_ref, None);
        assert_eq!(txn.month_ref, Some(4));
        assert_eq!(txn.invalid.len(), 2);

        let all = vec!["_id".to_string(), "amount".to_string(), "year_ref".to_string()];
        let problem = txn.problem(&all).unwrap();
        assert!(problem.starts_with("p1: `amount` is not a decimal number"));
        assert_eq!(txn.problem(&["_id".to_string()]), None);
    }

    #[test]
    fn test_normalize_empty_input() {
        let set = normalize(Vec::new());
        assert!(set.is_empty());
        assert!(set.fields.is_empty());
    }
}
