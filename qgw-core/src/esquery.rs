//! A dotted-path write-through tree over a JSON document, the systems
//! equivalent of the original's `Data()`/`wrap()` objects that
//! auto-create attribute nodes on write (§9 DESIGN NOTES). The compiler
//! never depends on structural identity of this tree, only on the
//! emitted document, so a `serde_json::Value` wrapper with `set`/`merge`
//! is enough.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct EsQuery(pub Value);

impl EsQuery {
    pub fn new() -> Self {
        EsQuery(Value::Object(Map::new()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Object(m) => m.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    /// `es_query.aggs["k"].terms.field = f` — writes `value` at
    /// `dotted_key`, creating intermediate objects on demand.
    pub fn set(&mut self, dotted_key: &str, value: Value) {
        let parts: Vec<&str> = dotted_key.split('.').collect();
        let mut node = self.root_mut();
        for (i, part) in parts.iter().enumerate() {
            if i == parts.len() - 1 {
                node.insert(part.to_string(), value);
                return;
            }
            node = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .expect("intermediate node is not an object");
        }
    }

    pub fn get(&self, dotted_key: &str) -> Option<&Value> {
        let mut cur = &self.0;
        for part in dotted_key.split('.') {
            cur = cur.get(part)?;
        }
        Some(cur)
    }

    /// `es_query.aggs = {"_match": {..., aggs: existing}}` — wraps the
    /// current document inside `subtree`, merging rather than clobbering
    /// any overlapping keys `subtree` doesn't itself define.
    pub fn merge(&mut self, subtree: Value) -> Self {
        let mut merged = subtree;
        merge_values(&mut merged, self.0.clone());
        EsQuery(merged)
    }

    fn root_mut(&mut self) -> &mut Map<String, Value> {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        self.0.as_object_mut().unwrap()
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn merge_values(into: &mut Value, from: Value) {
    match (into, from) {
        (Value::Object(into_map), Value::Object(from_map)) => {
            for (k, v) in from_map {
                merge_values(into_map.entry(k).or_insert(Value::Null), v);
            }
        }
        (slot, from) => {
            if slot.is_null() {
                *slot = from;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_nodes() {
        let mut q = EsQuery::new();
        q.set("aggs.k.terms.field", json!("f"));
        assert_eq!(q.get("aggs.k.terms.field"), Some(&json!("f")));
    }

    #[test]
    fn merge_wraps_without_clobbering() {
        let mut q = EsQuery::new();
        q.set("aggs.inner.terms.field", json!("x"));
        let wrapped = q.merge(json!({"aggs": {"_nested": {"nested": {"path": "a.b"}}}}));
        assert_eq!(wrapped.get("aggs._nested.nested.path"), Some(&json!("a.b")));
        assert_eq!(wrapped.get("aggs._nested.aggs.inner.terms.field"), Some(&json!("x")));
    }
}
