//! Walks a compiled aggregation response back into rows. The walk
//! itself is decoder-agnostic: it only understands the `_match` /
//! `_other` / `_missing` / `_join_<i>` / `_filter` / `_nested` node
//! names decoders and the compiler emit, and recurses until it runs out
//! of nesting levels, at which point whatever aggs are left are the
//! select clauses' leaf values (§4.5).

use serde_json::{json, Value};

use crate::aggregate_builder::{AggregateBuilder, Pull};
use crate::decoders::Decoder;

pub struct ResultWalker;

#[derive(Debug, Clone)]
pub struct Row {
    pub coordinates: Vec<Option<usize>>,
    pub values: Vec<(String, Value)>,
}

impl ResultWalker {
    /// Two passes over the same response: the first realizes any
    /// decoder's domain that wasn't known at compile time (`count` /
    /// `done_count`), the second drills to every leaf bucket and emits a
    /// row carrying each decoder's recovered coordinate alongside the
    /// pulled select values.
    pub fn walk(response_aggs: &Value, decoders: &mut [Box<dyn Decoder>], pulls: &[(String, Pull)]) -> Vec<Row> {
        let depth = decoders.iter().map(|d| d.start() + d.num_columns()).max().unwrap_or(0);

        if decoders.iter().any(|d| d.needs_count_pass()) {
            let mut parts = vec![Value::Null; depth];
            drill(response_aggs, depth as i64, &mut parts, &mut |parts, _node| {
                for decoder in decoders.iter_mut() {
                    if decoder.needs_count_pass() {
                        decoder.count(parts);
                    }
                }
            });
            for decoder in decoders.iter_mut() {
                decoder.done_count();
            }
        }

        let mut rows = Vec::new();
        let mut parts = vec![Value::Null; depth];
        drill(response_aggs, depth as i64, &mut parts, &mut |parts, node| {
            let coordinates = decoders.iter().map(|d| d.get_index(parts)).collect();
            let values = pulls.iter().map(|(name, pull)| (name.clone(), AggregateBuilder::pull(node, pull))).collect();
            rows.push(Row { coordinates, values });
        });
        rows
    }
}

fn drill(node: &Value, d: i64, parts: &mut [Value], on_leaf: &mut dyn FnMut(&[Value], &Value)) {
    let obj = match node.as_object() {
        Some(o) => o,
        None => return,
    };

    if let Some(filter_node) = obj.get("_filter") {
        drill(filter_node, d, parts, on_leaf);
        return;
    }
    if let Some(nested_node) = obj.get("_nested") {
        drill(nested_node, d, parts, on_leaf);
        return;
    }
    if let Some(match_node) = obj.get("_match") {
        if let Some(buckets) = match_node.get("buckets").and_then(|b| b.as_array()) {
            for bucket in buckets {
                if doc_count_is_zero(bucket) {
                    continue;
                }
                parts[(d - 1) as usize] = bucket.clone();
                drill(bucket, d - 1, parts, on_leaf);
            }
            // Elasticsearch nests the catch-all bucket its
            // `other_bucket_key` names inside the terms response itself,
            // a sibling of `buckets`, not beside `_match` in this object.
            if let Some(other_node) = match_node.get("_other") {
                if !doc_count_is_zero(other_node) {
                    parts[(d - 1) as usize] = other_node.clone();
                    drill(other_node, d - 1, parts, on_leaf);
                }
            }
            return;
        }
    }
    if let Some(missing_node) = obj.get("_missing") {
        if !doc_count_is_zero(missing_node) {
            parts[(d - 1) as usize] = Value::Null;
            drill(missing_node, d - 1, parts, on_leaf);
        }
        return;
    }
    let join_keys: Vec<(usize, &Value)> = obj
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("_join_").and_then(|suffix| suffix.parse::<usize>().ok()).map(|i| (i, v)))
        .collect();
    if !join_keys.is_empty() {
        for (i, bucket) in join_keys {
            if doc_count_is_zero(bucket) {
                continue;
            }
            parts[(d - 1) as usize] = json!({"key": i});
            drill(bucket, d - 1, parts, on_leaf);
        }
        return;
    }

    if doc_count_is_zero(node) {
        return;
    }
    on_leaf(parts, node);
}

/// `doc_count` is absent on nodes that aren't themselves a bucket (the
/// root aggs object, a leaf stat), so absence doesn't count as zero —
/// only an explicit `0` does.
fn doc_count_is_zero(node: &Value) -> bool {
    node.get("doc_count").and_then(|c| c.as_i64()).map(|c| c == 0).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoders::DefaultDecoder;
    use crate::expr::Expr;
    use crate::query::Edge;

    #[test]
    fn walk_recovers_coordinates_and_values() {
        let response = json!({
            "_match": {
                "buckets": [
                    {"key": "b", "doc_count": 2, "_s_count": {"value": 2}},
                    {"key": "c", "doc_count": 3, "_s_count": {"value": 3}}
                ]
            }
        });

        let mut decoders: Vec<Box<dyn Decoder>> = vec![Box::new(DefaultDecoder::new(Edge::new("status", Expr::var("status")), "status".to_string()))];
        let pulls = vec![("count".to_string(), Pull::DocCount)];

        let rows = ResultWalker::walk(&response, &mut decoders, &pulls);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].coordinates, vec![Some(0)]);
        assert_eq!(rows[1].coordinates, vec![Some(1)]);
        assert_eq!(rows[0].values[0].1, json!(2));
    }
}
