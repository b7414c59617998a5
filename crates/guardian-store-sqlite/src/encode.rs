//! Conversions between SQLite values and JSON row values.
//!
//! Columns are loosely typed, so nothing here interprets a value; it only
//! moves it between representations. Blobs have no JSON form and are
//! hex-encoded.

use guardian_core::store::RawRow;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

pub(crate) fn to_sql(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => n
      .as_i64()
      .map(SqlValue::Integer)
      .or_else(|| n.as_f64().map(SqlValue::Real))
      .unwrap_or(SqlValue::Null),
    Value::String(s) => SqlValue::Text(s.clone()),
    // Structured values are stored as their JSON text.
    other => SqlValue::Text(other.to_string()),
  }
}

pub(crate) fn to_json(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::from(i),
    ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
    ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
  }
}

/// Run `stmt` and collect every row as a column-name → value map.
pub(crate) fn read_rows(
  stmt: &mut rusqlite::Statement<'_>,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<RawRow>> {
  let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
  let mut rows = stmt.query(params)?;
  let mut out = Vec::new();
  while let Some(row) = rows.next()? {
    let mut raw = RawRow::new();
    for (i, name) in names.iter().enumerate() {
      raw.insert(name.clone(), to_json(row.get_ref(i)?));
    }
    out.push(raw);
  }
  Ok(out)
}

/// Keep only `fields`, in the row's own order; an empty list keeps everything.
pub(crate) fn project(row: &RawRow, fields: &[String]) -> RawRow {
  if fields.is_empty() {
    return row.clone();
  }
  row
    .iter()
    .filter(|(name, _)| fields.contains(name))
    .map(|(name, value)| (name.clone(), value.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn json_values_map_to_sqlite_affinities() {
    assert_eq!(to_sql(&json!(null)), SqlValue::Null);
    assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
    assert_eq!(to_sql(&json!(42)), SqlValue::Integer(42));
    assert_eq!(to_sql(&json!(0.5)), SqlValue::Real(0.5));
    assert_eq!(to_sql(&json!("x")), SqlValue::Text("x".into()));
    assert_eq!(to_sql(&json!({ "name": "Lab-1" })), SqlValue::Text("{\"name\":\"Lab-1\"}".into()));
    assert_eq!(to_sql(&json!(["a", "b"])), SqlValue::Text("[\"a\",\"b\"]".into()));
  }

  #[test]
  fn sqlite_values_map_to_json() {
    assert_eq!(to_json(ValueRef::Null), json!(null));
    assert_eq!(to_json(ValueRef::Integer(7)), json!(7));
    assert_eq!(to_json(ValueRef::Real(0.25)), json!(0.25));
    assert_eq!(to_json(ValueRef::Real(f64::NAN)), json!(null));
    assert_eq!(to_json(ValueRef::Text(b"Lab-1")), json!("Lab-1"));
    assert_eq!(to_json(ValueRef::Blob(&[0xde, 0xad])), json!("dead"));
  }

  #[test]
  fn projection_keeps_requested_columns() {
    let row = json!({ "id": "p1", "full_name": "Amy", "course": "CS" });
    let row = row.as_object().unwrap();
    let fields = vec!["full_name".to_owned(), "id".to_owned()];
    let projected = project(row, &fields);
    assert_eq!(projected.len(), 2);
    assert_eq!(projected["full_name"], "Amy");
    assert_eq!(project(row, &[]).len(), 3);
  }
}
