//! Turns `select` clauses into leaf aggregation nodes and the pull-path
//! table that tells `ResultWalker` how to read a scalar back out of each
//! one (§4.3). This is the innermost layer of the compiled tree; every
//! decoder nests its own aggregation node around whatever this module
//! produces.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::query::{AggKind, SelectClause};

/// How to recover a select clause's scalar (or list, for `union`) value
/// from the ES response bucket that contains its aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// The enclosing bucket's own `doc_count`, no sub-aggregation needed.
    DocCount,
    /// `{key}.value`.
    Field(String),
    /// `{key}.values.{percent}` from a `percentiles` aggregation.
    Percentile(String, String),
    /// The whole `{key}` subtree minus `doc_count`, for `stats`.
    Stats(String),
    /// `{key}.buckets[*].key`, for `union`.
    Union(String),
}

pub struct AggregateBuilder;

impl AggregateBuilder {
    /// Builds the leaf `aggs` object for one bucket's worth of select
    /// clauses, plus the pull-path for each clause keyed by its name.
    /// Clauses with `aggregate: none` on an aggregating query pull
    /// straight from `_source` on the matching document and are skipped
    /// here; `ResultWalker` handles them against the raw hit.
    pub fn build(selects: &[SelectClause]) -> Result<(Value, HashMap<String, Pull>)> {
        let mut aggs = Map::new();
        let mut pulls = HashMap::new();

        for select in selects {
            let key = agg_key(select);
            match select.aggregate {
                AggKind::None => continue,
                AggKind::Count => {
                    if matches!(&select.value, Expr::Variable(v) if v == ".") {
                        pulls.insert(select.name.clone(), Pull::DocCount);
                        continue;
                    }
                    aggs.insert(key.clone(), json!({"value_count": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Field(key));
                }
                AggKind::Sum => {
                    aggs.insert(key.clone(), json!({"sum": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Field(key));
                }
                AggKind::Min => {
                    aggs.insert(key.clone(), json!({"min": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Field(key));
                }
                AggKind::Max => {
                    aggs.insert(key.clone(), json!({"max": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Field(key));
                }
                AggKind::Avg => {
                    aggs.insert(key.clone(), json!({"avg": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Field(key));
                }
                AggKind::Cardinality => {
                    aggs.insert(key.clone(), json!({"cardinality": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Field(key));
                }
                AggKind::Stats => {
                    aggs.insert(key.clone(), json!({"stats": field_or_script(&select.value)}));
                    pulls.insert(select.name.clone(), Pull::Stats(key));
                }
                AggKind::Median => {
                    let mut node = field_or_script_map(&select.value);
                    node.insert("percents".to_string(), json!([50.0]));
                    aggs.insert(key.clone(), json!({"percentiles": node}));
                    pulls.insert(select.name.clone(), Pull::Percentile(key, "50.0".to_string()));
                }
                AggKind::Percentile => {
                    let pct = select.percentile.unwrap_or(0.5);
                    if !(0.0..=1.0).contains(&pct) {
                        return Err(Error::compile(format!("percentile for {} must be between 0 and 1, got {}", select.name, pct)));
                    }
                    let percent = (pct * 100.0 * 1_000_000.0).round() / 1_000_000.0;
                    let mut node = field_or_script_map(&select.value);
                    node.insert("percents".to_string(), json!([percent]));
                    aggs.insert(key.clone(), json!({"percentiles": node}));
                    pulls.insert(select.name.clone(), Pull::Percentile(key, format_percent_key(percent)));
                }
                AggKind::Union => {
                    let mut node = field_or_script_map(&select.value);
                    node.insert("size".to_string(), json!(select.limit.unwrap_or(crate::decoders::MAX_LIMIT)));
                    aggs.insert(key.clone(), json!({"terms": node}));
                    pulls.insert(select.name.clone(), Pull::Union(key));
                }
            }
        }

        Ok((json!(aggs), pulls))
    }

    /// Reads one select clause's value back out of a walked bucket using
    /// its pull-path, or `Value::Null` if the aggregation key is absent
    /// (a bucket whose decoder combination never matched it, e.g. an
    /// `_other` catch-all with no matching documents).
    pub fn pull(bucket: &Value, pull: &Pull) -> Value {
        match pull {
            Pull::DocCount => bucket.get("doc_count").cloned().unwrap_or(json!(0)),
            Pull::Field(key) => bucket.get(key).and_then(|v| v.get("value")).cloned().unwrap_or(Value::Null),
            Pull::Percentile(key, pct) => bucket
                .get(key)
                .and_then(|v| v.get("values"))
                .and_then(|v| v.get(pct))
                .cloned()
                .unwrap_or(Value::Null),
            Pull::Stats(key) => {
                let mut out = bucket.get(key).cloned().unwrap_or(Value::Null);
                if let Some(obj) = out.as_object_mut() {
                    obj.remove("doc_count");
                }
                out
            }
            Pull::Union(key) => {
                let buckets = bucket.get(key).and_then(|v| v.get("buckets")).and_then(|v| v.as_array());
                match buckets {
                    Some(bs) => Value::Array(bs.iter().filter_map(|b| b.get("key").cloned()).collect()),
                    None => Value::Array(vec![]),
                }
            }
        }
    }
}

fn agg_key(select: &SelectClause) -> String {
    format!("_s_{}", select.name)
}

fn field_or_script(e: &Expr) -> Value {
    Value::Object(field_or_script_map(e))
}

fn field_or_script_map(e: &Expr) -> Map<String, Value> {
    let mut m = Map::new();
    match e {
        Expr::Variable(v) => {
            m.insert("field".to_string(), json!(v));
        }
        _ => {
            m.insert("script".to_string(), json!({"source": e.to_painless().script}));
        }
    }
    m
}

fn format_percent_key(pct: f64) -> String {
    if (pct.fract()).abs() < f64::EPSILON {
        format!("{:.1}", pct)
    } else {
        format!("{}", pct)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::SelectClause;

    fn select(name: &str, value: Expr, agg: AggKind) -> SelectClause {
        SelectClause { name: name.to_string(), value, aggregate: agg, percentile: None, limit: None }
    }

    #[test]
    fn count_of_dot_pulls_doc_count() {
        let selects = vec![select("count", Expr::var("."), AggKind::Count)];
        let (aggs, pulls) = AggregateBuilder::build(&selects).unwrap();
        assert_eq!(aggs, json!({}));
        assert_eq!(pulls.get("count"), Some(&Pull::DocCount));
    }

    #[test]
    fn sum_emits_sum_agg_and_field_pull() {
        let selects = vec![select("total", Expr::var("amount"), AggKind::Sum)];
        let (aggs, pulls) = AggregateBuilder::build(&selects).unwrap();
        assert_eq!(aggs["_s_total"]["sum"]["field"], json!("amount"));
        let bucket = json!({"_s_total": {"value": 42.0}});
        assert_eq!(AggregateBuilder::pull(&bucket, pulls.get("total").unwrap()), json!(42.0));
    }

    #[test]
    fn percentile_pull_path_matches_percent_key() {
        let mut s = select("p95", Expr::var("latency"), AggKind::Percentile);
        s.percentile = Some(0.95);
        let (aggs, pulls) = AggregateBuilder::build(&[s]).unwrap();
        assert_eq!(aggs["_s_p95"]["percentiles"]["percents"], json!([95.0]));
        let bucket = json!({"_s_p95": {"values": {"95.0": 12.3}}});
        assert_eq!(AggregateBuilder::pull(&bucket, pulls.get("p95").unwrap()), json!(12.3));
    }

    #[test]
    fn percentile_outside_unit_range_is_rejected() {
        let mut s = select("bad", Expr::var("latency"), AggKind::Percentile);
        s.percentile = Some(95.0);
        assert!(AggregateBuilder::build(&[s]).is_err());
    }
}
