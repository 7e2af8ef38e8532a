//! Turns a search response into alert records.

use esalert_core::{AlertError, Condition, Field, Record, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::conditions::conditions_met;
use crate::traverse::flatten;

/// Separator placed between rendered hits in a body record.
pub const HITS_DELIMITER: &str = "\n----------------------------------------\n";

/// Output of [`process`]: the records to deliver plus the raw hit documents.
#[derive(Debug, Default)]
pub struct Transformed {
    pub records: Vec<Record>,
    pub hits: Vec<Map<String, Value>>,
}

impl Transformed {
    /// Nothing to alert on.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Build the records for one query response.
///
/// Unmet conditions suppress the alert entirely. Each filter path yields at
/// most one field record; the body field yields at most one body record.
pub fn process(
    response: &Value,
    filters: &[String],
    body_field: Option<&str>,
    conditions: &[Condition],
) -> Result<Transformed> {
    if !conditions.is_empty() && !conditions_met(response, conditions) {
        return Ok(Transformed::default());
    }

    let mut records = Vec::new();
    for filter in filters {
        let fields = gather_fields(&flatten(response, filter));
        if fields.is_empty() {
            continue;
        }
        records.push(Record::Fields {
            filter: filter.clone(),
            fields,
        });
    }

    let Some(body_field) = body_field.filter(|f| !f.is_empty()) else {
        return Ok(Transformed { records, hits: Vec::new() });
    };

    let (rendered, hits) = gather_hits(flatten(response, body_field))?;
    if !rendered.is_empty() {
        records.push(Record::Body {
            filter: body_field.to_string(),
            text: rendered.join(HITS_DELIMITER),
        });
    }
    Ok(Transformed { records, hits })
}

/// Decode bucket-shaped leaves into fields, dropping anything without a usable key or count.
fn gather_fields(elems: &[Value]) -> Vec<Field> {
    elems
        .iter()
        .filter_map(Value::as_object)
        .filter_map(decode_field)
        .filter(Field::is_valid)
        .collect()
}

fn decode_field(bucket: &Map<String, Value>) -> Option<Field> {
    let key = match bucket.get("key")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => bucket
            .get("key_as_string")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| n.to_string()),
        _ => return None,
    };
    let count = bucket.get("doc_count")?.as_i64()?;
    Some(Field { key, count })
}

/// Keep every document-shaped leaf and render it as indented JSON.
fn gather_hits(body: Vec<Value>) -> Result<(Vec<String>, Vec<Map<String, Value>>)> {
    let mut rendered = Vec::with_capacity(body.len());
    let mut hits = Vec::with_capacity(body.len());
    for elem in body {
        let Value::Object(hit) = elem else {
            continue;
        };
        rendered.push(render_hit(&hit)?);
        hits.push(hit);
    }
    Ok((rendered, hits))
}

fn render_hit(hit: &Map<String, Value>) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    hit.serialize(&mut ser)
        .map_err(|e| AlertError::Render(format!("error rendering hit: {e}")))?;
    String::from_utf8(buf).map_err(|e| AlertError::Render(e.to_string()))
}
