//! Request body and response shape of the invoice metadata query.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::types::SubjectType;

/// Fields known to carry the record list, in order of preference.
const LIST_FIELDS: [&str; 3] = ["invoices", "invoiceHeaderList", "invoiceMetadataList"];

pub fn format_gateway_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

pub fn query_body(subject: SubjectType, from: DateTime<Utc>, to: DateTime<Utc>) -> Value {
    json!({
        "subjectType": subject.as_str(),
        "dateRange": {
            "dateType": "Invoicing",
            "from": format_gateway_datetime(from),
            "to": format_gateway_datetime(to),
        }
    })
}

/// Pull the record list out of a query response page.
///
/// Known list fields win; otherwise the first non-empty array field, in
/// response order, is used. A bare array body is taken as the list itself.
pub fn extract_records(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            let known = LIST_FIELDS
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_array));
            let list = known.or_else(|| {
                map.iter().find_map(|(key, value)| {
                    let list = value.as_array().filter(|items| !items.is_empty())?;
                    tracing::debug!("Taking record list from unrecognised field '{}'", key);
                    Some(list)
                })
            });
            list.cloned().unwrap_or_default()
        }
        _ => Vec::new(),
    }
}
