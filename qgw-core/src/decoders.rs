//! Per-edge decoder strategies (§4.2). Each decoder both emits its
//! fragment of the aggregation tree and knows how to recover a
//! coordinate from a walked bucket. Variants carry their domain state in
//! value types; there is no inheritance, only the `Decoder` trait.

use serde_json::{json, Map, Value};

use crate::query::{Dir, Domain, DomainKind, Edge, Partition};

pub const MAX_LIMIT: usize = 10_000;

/// Extracts the `aggs` subtree of a previously-built query fragment, or
/// an empty object if there isn't one yet (the innermost decoder wraps
/// the leaf stat aggregations built by `AggregateBuilder`).
fn inner_aggs(prior: &Value) -> Value {
    prior.get("aggs").cloned().unwrap_or_else(|| Value::Object(Map::new()))
}

fn bucket_key_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub trait Decoder: std::fmt::Debug {
    fn num_columns(&self) -> usize;
    fn start(&self) -> usize;
    fn set_start(&mut self, start: usize);

    /// Wraps `prior` (a full query fragment, `{"aggs": {...}}` or empty)
    /// one level deeper, returning the new full fragment.
    fn append_query(&self, prior: Value) -> Value;

    /// Recovers this decoder's coordinate from the walked `parts` row,
    /// or `None` for a bucket this decoder has no domain slot for.
    fn get_index(&self, parts: &[Value]) -> Option<usize>;

    /// Called once per row during the counting pass, for decoders whose
    /// domain isn't known until the response is seen.
    fn count(&mut self, parts: &[Value]);
    fn done_count(&mut self);
    fn needs_count_pass(&self) -> bool;

    /// The realized output edge, domain populated if it wasn't already.
    fn edge(&self) -> Edge;
}

#[derive(Debug, Clone)]
pub struct DefaultDecoder {
    pub edge_template: Edge,
    pub field: String,
    pub start: usize,
    pub size: usize,
    domain: Vec<String>,
}

impl DefaultDecoder {
    pub fn new(edge_template: Edge, field: String) -> Self {
        DefaultDecoder { edge_template, field, start: 0, size: MAX_LIMIT, domain: Vec::new() }
    }
}

impl Decoder for DefaultDecoder {
    fn num_columns(&self) -> usize {
        1
    }
    fn start(&self) -> usize {
        self.start
    }
    fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    fn append_query(&self, prior: Value) -> Value {
        let inner = inner_aggs(&prior);
        let mut aggs = Map::new();
        aggs.insert(
            "_match".to_string(),
            json!({"terms": {"field": self.field, "size": self.size, "other_bucket": true, "other_bucket_key": "_other"}, "aggs": inner}),
        );
        if self.edge_template.allow_nulls {
            aggs.insert("_missing".to_string(), json!({"missing": {"field": self.field}, "aggs": inner}));
        }
        json!({"aggs": Value::Object(aggs)})
    }

    fn get_index(&self, parts: &[Value]) -> Option<usize> {
        match parts.get(self.start) {
            None | Some(Value::Null) => {
                if self.edge_template.allow_nulls {
                    Some(self.domain.len())
                } else {
                    None
                }
            }
            Some(b) => {
                let key = bucket_key_string(b.get("key")?);
                self.domain.iter().position(|d| d == &key)
            }
        }
    }

    fn count(&mut self, parts: &[Value]) {
        if let Some(b) = parts.get(self.start) {
            if let Some(key) = b.get("key") {
                let key = bucket_key_string(key);
                if !self.domain.contains(&key) {
                    self.domain.push(key);
                }
            }
        }
    }

    fn done_count(&mut self) {
        self.domain.sort();
        if self.edge_template.domain.sort == Some(Dir::Desc) {
            self.domain.reverse();
        }
    }

    fn needs_count_pass(&self) -> bool {
        true
    }

    fn edge(&self) -> Edge {
        let mut partitions: Vec<Partition> = self.domain.iter().map(|k| Partition { name: k.clone(), where_: None }).collect();
        if self.edge_template.allow_nulls {
            partitions.push(Partition { name: "(null)".to_string(), where_: None });
        }
        let mut edge = self.edge_template.clone();
        edge.domain = Domain { kind: DomainKind::Set { partitions }, sort: self.edge_template.domain.sort };
        edge
    }
}

#[derive(Debug, Clone)]
pub struct RangeDecoder {
    pub edge_template: Edge,
    pub field: String,
    pub start: usize,
    pub boundaries: Vec<(f64, f64)>,
}

impl RangeDecoder {
    pub fn new(edge_template: Edge, field: String, min: f64, max: f64, interval: f64) -> Self {
        let mut boundaries = Vec::new();
        let mut lo = min;
        while lo < max {
            let hi = (lo + interval).min(max);
            boundaries.push((lo, hi));
            lo = hi;
        }
        RangeDecoder { edge_template, field, start: 0, boundaries }
    }

    fn range_key(lo: f64, hi: f64) -> String {
        format!("{}-{}", lo, hi)
    }
}

impl Decoder for RangeDecoder {
    fn num_columns(&self) -> usize {
        1
    }
    fn start(&self) -> usize {
        self.start
    }
    fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    fn append_query(&self, prior: Value) -> Value {
        let inner = inner_aggs(&prior);
        let ranges: Vec<Value> = self
            .boundaries
            .iter()
            .map(|(lo, hi)| json!({"from": lo, "to": hi, "key": Self::range_key(*lo, *hi)}))
            .collect();
        let mut aggs = Map::new();
        aggs.insert("_match".to_string(), json!({"range": {"field": self.field, "ranges": ranges}, "aggs": inner}));
        json!({"aggs": Value::Object(aggs)})
    }

    fn get_index(&self, parts: &[Value]) -> Option<usize> {
        let b = parts.get(self.start)?;
        if b.is_null() {
            return None;
        }
        let key = bucket_key_string(b.get("key")?);
        self.boundaries.iter().position(|(lo, hi)| Self::range_key(*lo, *hi) == key)
    }

    fn count(&mut self, _parts: &[Value]) {}
    fn done_count(&mut self) {}
    fn needs_count_pass(&self) -> bool {
        false
    }

    fn edge(&self) -> Edge {
        self.edge_template.clone()
    }
}

#[derive(Debug, Clone)]
pub struct DimFieldListDecoder {
    pub edge_template: Edge,
    pub fields: Vec<String>,
    pub start: usize,
    pub size: usize,
    domains: Vec<Vec<String>>,
}

impl DimFieldListDecoder {
    pub fn new(edge_template: Edge, fields: Vec<String>) -> Self {
        let n = fields.len();
        DimFieldListDecoder { edge_template, fields, start: 0, size: MAX_LIMIT, domains: vec![Vec::new(); n] }
    }
}

impl Decoder for DimFieldListDecoder {
    fn num_columns(&self) -> usize {
        self.fields.len()
    }
    fn start(&self) -> usize {
        self.start
    }
    fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    fn append_query(&self, prior: Value) -> Value {
        let mut inner = inner_aggs(&prior);
        for field in self.fields.iter().rev() {
            let node = json!({"terms": {"field": field, "size": self.size}, "aggs": inner});
            inner = json!({"_match": node});
        }
        json!({"aggs": inner})
    }

    fn get_index(&self, parts: &[Value]) -> Option<usize> {
        let mut positions = Vec::with_capacity(self.fields.len());
        for (i, domain) in self.domains.iter().enumerate() {
            let b = parts.get(self.start + i)?;
            let key = bucket_key_string(b.get("key")?);
            positions.push(domain.iter().position(|d| d == &key)?);
        }
        let mut index = 0usize;
        for (i, pos) in positions.iter().enumerate() {
            let radix: usize = self.domains[i + 1..].iter().map(|d| d.len().max(1)).product();
            index += pos * radix;
        }
        Some(index)
    }

    fn count(&mut self, parts: &[Value]) {
        for (i, domain) in self.domains.iter_mut().enumerate() {
            if let Some(b) = parts.get(self.start + i) {
                if let Some(key) = b.get("key") {
                    let key = bucket_key_string(key);
                    if !domain.contains(&key) {
                        domain.push(key);
                    }
                }
            }
        }
    }

    fn done_count(&mut self) {
        for domain in self.domains.iter_mut() {
            domain.sort();
            if self.edge_template.domain.sort == Some(Dir::Desc) {
                domain.reverse();
            }
        }
    }

    fn needs_count_pass(&self) -> bool {
        true
    }

    fn edge(&self) -> Edge {
        self.edge_template.clone()
    }
}

/// Realizes any edge whose domain is a fixed, named list of buckets via
/// one `filter` sub-aggregation per bucket, dispatched through the
/// `_join_<i>` keys `ResultWalker` recognizes. Used both for an
/// object-typed edge (one filter per leaf field, `exists`) and for a
/// `set` domain whose partitions each carry an explicit `where` (one
/// filter per partition's predicate).
#[derive(Debug, Clone)]
pub struct ObjectDecoder {
    pub edge_template: Edge,
    pub filters: Vec<(String, Value)>,
    pub start: usize,
}

impl ObjectDecoder {
    pub fn from_leaf_fields(edge_template: Edge, leaf_fields: Vec<String>) -> Self {
        let filters = leaf_fields.into_iter().map(|f| (f.clone(), json!({"exists": {"field": f}}))).collect();
        ObjectDecoder { edge_template, filters, start: 0 }
    }

    pub fn from_named_filters(edge_template: Edge, filters: Vec<(String, Value)>) -> Self {
        ObjectDecoder { edge_template, filters, start: 0 }
    }
}

impl Decoder for ObjectDecoder {
    fn num_columns(&self) -> usize {
        1
    }
    fn start(&self) -> usize {
        self.start
    }
    fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    fn append_query(&self, prior: Value) -> Value {
        let inner = inner_aggs(&prior);
        let mut aggs = Map::new();
        for (i, (_, filter)) in self.filters.iter().enumerate() {
            aggs.insert(format!("_join_{}", i), json!({"filter": filter, "aggs": inner}));
        }
        json!({"aggs": Value::Object(aggs)})
    }

    fn get_index(&self, parts: &[Value]) -> Option<usize> {
        let b = parts.get(self.start)?;
        b.get("key").and_then(|k| k.as_i64()).map(|i| i as usize)
    }

    fn count(&mut self, _parts: &[Value]) {}
    fn done_count(&mut self) {}
    fn needs_count_pass(&self) -> bool {
        true
    }

    fn edge(&self) -> Edge {
        let partitions = self.filters.iter().map(|(name, _)| Partition { name: name.clone(), where_: None }).collect();
        let mut edge = self.edge_template.clone();
        edge.domain = Domain { kind: DomainKind::Set { partitions }, sort: self.edge_template.domain.sort };
        edge
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::Edge;

    #[test]
    fn default_decoder_realizes_sorted_domain() {
        let mut d = DefaultDecoder::new(Edge::new("a", crate::expr::Expr::var("a")), "a".to_string());
        d.count(&[json!({"key": "c"})]);
        d.count(&[json!({"key": "b"})]);
        d.done_count();
        assert_eq!(d.get_index(&[json!({"key": "b"})]), Some(0));
        assert_eq!(d.get_index(&[json!({"key": "c"})]), Some(1));
    }

    #[test]
    fn default_decoder_allow_nulls_maps_to_trailing_slot() {
        let mut edge = Edge::new("a", crate::expr::Expr::var("a"));
        edge.allow_nulls = true;
        let mut d = DefaultDecoder::new(edge, "a".to_string());
        d.count(&[json!({"key": "b"})]);
        d.done_count();
        assert_eq!(d.get_index(&[Value::Null]), Some(1));
    }

    #[test]
    fn dim_field_list_decoder_mixed_radix_index() {
        let edge = Edge::new("dim", crate::expr::Expr::var("dim"));
        let mut d = DimFieldListDecoder::new(edge, vec!["x".to_string(), "y".to_string()]);
        d.count(&[json!({"key": "a"}), json!({"key": "p"})]);
        d.count(&[json!({"key": "a"}), json!({"key": "q"})]);
        d.count(&[json!({"key": "b"}), json!({"key": "p"})]);
        d.done_count();
        // domains: x=[a,b], y=[p,q]; radix of y = 2
        assert_eq!(d.get_index(&[json!({"key": "a"}), json!({"key": "p"})]), Some(0));
        assert_eq!(d.get_index(&[json!({"key": "a"}), json!({"key": "q"})]), Some(1));
        assert_eq!(d.get_index(&[json!({"key": "b"}), json!({"key": "p"})]), Some(2));
    }
}
