//! Top-level compilation: stitches `WhereSplitter`, `AggregateBuilder`
//! and `QueryPlanner`'s decoders into one Elasticsearch query body,
//! nesting depth-first so that a decoder's `_filter`/`_nested` wrapper
//! only appears once per depth transition instead of once per decoder
//! (§4.4).

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::aggregate_builder::{AggregateBuilder, Pull};
use crate::decoders::Decoder;
use crate::error::{Error, Result};
use crate::esquery::EsQuery;
use crate::expr::Expr;
use crate::planner::{CompilationContext, QueryPlanner};
use crate::query::Query;
use crate::schema::Schema;
use crate::where_splitter::WhereSplitter;

pub struct Compiled {
    pub es_query: Value,
    pub decoders: Vec<Box<dyn Decoder>>,
    pub pulls: HashMap<String, Pull>,
}

pub fn compile(query: &Query, schema: &dyn Schema) -> Result<Compiled> {
    let ctx = CompilationContext::new(schema, query);
    let where_ = rewrite_vars(&query.where_, &ctx);
    let where_fragments = WhereSplitter::split(&where_, schema, &query.from);
    reject_if_too_deep(&where_fragments, &ctx)?;

    let (leaf_aggs, pulls) = AggregateBuilder::build(&query.select)?;
    let decoders = QueryPlanner::plan(query, &ctx)?;

    if decoders.is_empty() {
        // Non-aggregating query: the leaf aggs (if any) sit straight
        // under the root, no decoder nesting at all.
        let mut top = EsQuery::new();
        top.set("aggs", leaf_aggs);
        top.set("size", json!(0));
        top.set("query", root_filter(&where_fragments).to_esfilter());
        return Ok(Compiled { es_query: top.into_value(), decoders, pulls });
    }

    let mut depths = Vec::with_capacity(decoders.len());
    for decoder in &decoders {
        depths.push(decoder_depth(decoder.as_ref(), &ctx)?);
    }
    let max_depth = depths.iter().copied().max().unwrap_or(0);

    let mut order: Vec<usize> = (0..decoders.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(depths[i]));

    let mut inner = json!({"aggs": leaf_aggs});
    let mut cursor = 0usize;

    for depth in (1..=max_depth).rev() {
        while cursor < order.len() && depths[order[cursor]] == depth {
            inner = decoders[order[cursor]].append_query(inner);
            cursor += 1;
        }
        inner = wrap_filter(inner, where_fragments.get(depth as usize));
        if let Some(path) = nested_path_at(&decoders, &order, &depths, &ctx, depth) {
            inner = wrap_nested(inner, &path);
        }
    }
    while cursor < order.len() && depths[order[cursor]] == 0 {
        inner = decoders[order[cursor]].append_query(inner);
        cursor += 1;
    }

    let mut top = EsQuery::new();
    if let Value::Object(m) = inner {
        for (k, v) in m {
            top.set(&k, v);
        }
    }
    top.set("size", json!(0));
    top.set("query", root_filter(&where_fragments).to_esfilter());

    Ok(Compiled { es_query: top.into_value(), decoders, pulls })
}

fn rewrite_vars(e: &Expr, ctx: &CompilationContext) -> Expr {
    e.map(&ctx.rename)
}

fn root_filter(fragments: &[Expr]) -> Expr {
    fragments.first().cloned().unwrap_or(Expr::Null)
}

/// A query's `from` is, in this crate, always a top-level index rather
/// than a path that is itself nested, so the addressable depth is its
/// own depth (`0` unless the schema says otherwise) plus one more level
/// for whatever nesting an edge introduces — mirrors `es_aggsop`'s
/// `if any(split_where[2::])` check for a non-nested `from` (and
/// `split_where[1::]` for a `from` that is itself already nested).
fn reject_if_too_deep(where_fragments: &[Expr], ctx: &CompilationContext) -> Result<()> {
    let from_depth = ctx.schema.columns(&ctx.from).first().map(|c| c.depth()).unwrap_or(0);
    let max_addressable_depth = from_depth + 1;
    let too_deep = where_fragments.iter().enumerate().any(|(i, e)| i as i64 > max_addressable_depth && !matches!(e, Expr::Null));
    if too_deep {
        return Err(Error::where_too_deep());
    }
    Ok(())
}

fn wrap_filter(inner: Value, fragment: Option<&Expr>) -> Value {
    match fragment {
        None | Some(Expr::Null) => inner,
        Some(expr) => {
            let mut node = EsQuery(inner);
            let wrapped = node.merge(json!({"filter": expr.to_esfilter()}));
            let mut out = EsQuery::new();
            out.set("aggs._filter", wrapped.into_value());
            out.into_value()
        }
    }
}

fn wrap_nested(inner: Value, path: &str) -> Value {
    let mut node = EsQuery(inner);
    let wrapped = node.merge(json!({"nested": {"path": path}}));
    let mut out = EsQuery::new();
    out.set("aggs._nested", wrapped.into_value());
    out.into_value()
}

/// The depth a decoder's aggregation nests at. Every variable the
/// edge's expression references must resolve to the same schema depth
/// (`planner::edge_var_path` already enforces this when the decoder is
/// built) — this just reads that common depth back out, erroring again
/// rather than trusting the invariant silently.
fn decoder_depth(decoder: &dyn Decoder, ctx: &CompilationContext) -> Result<i64> {
    let edge = decoder.edge();
    let vars = match &edge.value {
        Some(v) => v.vars(),
        None => return Ok(0),
    };
    let mut vars = vars.into_iter();
    let first = match vars.next() {
        Some(p) => p,
        None => return Ok(0),
    };
    let first_depth = ctx.depth_of(&first);
    for other in vars {
        if ctx.depth_of(&other) != first_depth {
            return Err(Error::spans_tables(&edge.name));
        }
    }
    Ok(first_depth)
}

fn nested_path_at(decoders: &[Box<dyn Decoder>], order: &[usize], depths: &[i64], ctx: &CompilationContext, depth: i64) -> Option<String> {
    for &i in order {
        if depths[i] != depth {
            continue;
        }
        let decoder = decoders[i].as_ref();
        let edge = decoder.edge();
        if let Some(v) = &edge.value {
            if let Some(p) = v.vars().into_iter().next() {
                let columns = ctx.schema.columns(&format!("{}.{}", ctx.from, p));
                if let Some(col) = columns.first() {
                    let idx = (col.nested_path.len() as i64 - 1 - depth) as usize;
                    return col.nested_path.get(idx).cloned();
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::Expr;
    use crate::query::{AggKind, Edge, SelectClause};
    use crate::schema::{Column, MapSchema, TypeTag};

    #[test]
    fn flat_aggregation_nests_one_match_level() {
        let schema = MapSchema::new().with_column("incidents.status", Column::root("status", TypeTag::String));
        let mut query = Query::new("incidents");
        query.edges.push(Edge::new("status", Expr::var("status")));
        query.select.push(SelectClause { name: "count".to_string(), value: Expr::var("."), aggregate: AggKind::Count, percentile: None, limit: None });

        let compiled = compile(&query, &schema).unwrap();
        assert_eq!(compiled.es_query["aggs"]["_match"]["terms"]["field"], json!("status"));
        assert_eq!(compiled.es_query["size"], json!(0));
    }

    #[test]
    fn non_aggregating_query_has_no_decoders() {
        let schema = MapSchema::new();
        let query = Query::new("incidents");
        let compiled = compile(&query, &schema).unwrap();
        assert!(compiled.decoders.is_empty());
    }

    #[test]
    fn where_clause_deeper_than_addressable_depth_is_rejected() {
        let schema = MapSchema::new()
            .with_column("incidents.status", Column::root("status", TypeTag::String))
            .with_column(
                "incidents.tasks.steps.runtime",
                Column::nested("tasks.steps.runtime", TypeTag::Number, vec!["tasks".to_string(), "tasks.steps".to_string(), ".".to_string()]),
            );
        let mut query = Query::new("incidents");
        query.where_ = Expr::Gt(Box::new(Expr::var("tasks.steps.runtime")), Box::new(Expr::Literal(json!(60))));

        assert!(compile(&query, &schema).is_err());
    }
}
