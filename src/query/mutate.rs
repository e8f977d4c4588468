//! Record mutations by identifier.

use serde_json::{Map, Value};

use crate::query::search::text_of;

/// Whether a record's identifier equals `id` (compared as text).
pub fn id_matches(record: &Value, id_field: &str, id: &str) -> bool {
    record.get(id_field).is_some_and(|v| text_of(v) == id)
}

pub fn find_index(records: &[Value], id_field: &str, id: &str) -> Option<usize> {
    records.iter().position(|r| id_matches(r, id_field, id))
}

/// Next identifier: one above the largest integer id, or a random token when
/// any existing id is non-numeric.
pub fn next_id(records: &[Value], id_field: &str) -> Value {
    let mut max: Option<i64> = None;
    for record in records {
        match record.get(id_field) {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) if n.as_i64().is_some() => {
                max = max.max(n.as_i64());
            }
            Some(_) => return Value::String(uuid::Uuid::new_v4().simple().to_string()),
        }
    }
    Value::from(max.map_or(1, |m| m + 1))
}

/// Append `body` (a record or an array of records) with fresh identifiers.
/// Returns the inserted records.
pub fn insert(records: &mut Vec<Value>, body: Value, id_field: &str) -> Vec<Value> {
    let incoming = match body {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut inserted = Vec::with_capacity(incoming.len());
    for item in incoming {
        let mut record = match item {
            Value::Object(map) => map,
            _ => continue,
        };
        record.remove(id_field);
        let mut with_id = Map::new();
        with_id.insert(id_field.to_string(), next_id(records, id_field));
        with_id.extend(record);
        let record = Value::Object(with_id);
        records.push(record.clone());
        inserted.push(record);
    }
    inserted
}

/// Shallow-merge `patch` into the record; the identifier is kept.
pub fn update(record: &mut Value, patch: &Value, id_field: &str) {
    let (Value::Object(target), Value::Object(patch)) = (record, patch) else {
        return;
    };
    for (key, value) in patch {
        if key != id_field {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Replace the record with `body`, keeping its identifier.
pub fn replace(record: &mut Value, body: &Value, id_field: &str) {
    let Value::Object(body) = body else {
        return;
    };
    let id = record.get(id_field).cloned();
    let mut replaced = Map::new();
    if let Some(id) = id {
        replaced.insert(id_field.to_string(), id);
    }
    for (key, value) in body {
        if key != id_field {
            replaced.insert(key.clone(), value.clone());
        }
    }
    *record = Value::Object(replaced);
}

/// Remove records whose index is listed; returns them in original order.
pub fn remove(records: &mut Vec<Value>, indices: &[usize]) -> Vec<Value> {
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(records.len());
    for (i, record) in records.drain(..).enumerate() {
        if indices.contains(&i) {
            removed.push(record);
        } else {
            kept.push(record);
        }
    }
    *records = kept;
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_id_numeric() {
        let records = vec![json!({"id": 5}), json!({"id": 2}), json!({"name": "no id"})];
        assert_eq!(next_id(&records, "id"), json!(6));
        assert_eq!(next_id(&[], "id"), json!(1));
    }

    #[test]
    fn test_next_id_non_numeric_is_token() {
        let records = vec![json!({"id": "abc"}), json!({"id": 3})];
        let id = next_id(&records, "id");
        assert_eq!(id.as_str().map(str::len), Some(32));
    }

    #[test]
    fn test_insert_discards_client_id() {
        let mut records = vec![json!({"id": 5, "name": "A"})];
        let inserted = insert(&mut records, json!({"id": 99, "name": "X"}), "id");
        assert_eq!(inserted, vec![json!({"id": 6, "name": "X"})]);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_insert_many_and_custom_id_field() {
        let mut records = vec![json!({"key": 1})];
        let inserted = insert(&mut records, json!([{"v": "a"}, {"v": "b"}, 7]), "key");
        assert_eq!(inserted, vec![json!({"key": 2, "v": "a"}), json!({"key": 3, "v": "b"})]);
    }

    #[test]
    fn test_update_and_replace_keep_id() {
        let mut record = json!({"id": 1, "name": "A", "age": 3});
        update(&mut record, &json!({"id": 7, "name": "B"}), "id");
        assert_eq!(record, json!({"id": 1, "name": "B", "age": 3}));

        replace(&mut record, &json!({"id": 7, "name": "C"}), "id");
        assert_eq!(record, json!({"id": 1, "name": "C"}));
    }

    #[test]
    fn test_find_and_remove() {
        let mut records = vec![json!({"id": 1}), json!({"id": "2"}), json!({"id": 3})];
        assert_eq!(find_index(&records, "id", "2"), Some(1));
        assert_eq!(find_index(&records, "id", "3"), Some(2));
        assert_eq!(find_index(&records, "id", "9"), None);

        let removed = remove(&mut records, &[0, 2]);
        assert_eq!(removed, vec![json!({"id": 1}), json!({"id": 3})]);
        assert_eq!(records, vec![json!({"id": "2"})]);
    }
}
