//! `QueryPlanner`: resolves each edge's target column against the
//! schema, orders edges to match any requested sort, and instantiates
//! the matching `Decoder` for each one (§4.1).

use std::collections::HashMap;

use crate::decoders::{DefaultDecoder, Decoder, DimFieldListDecoder, ObjectDecoder, RangeDecoder};
use crate::error::{Error, Result};
use crate::query::{Dir, DomainKind, Edge, Query};
use crate::schema::Schema;

/// Carries everything compilation needs that isn't the query itself: the
/// schema, and the `path -> es_column` rewrite built from it. Held for
/// the lifetime of one `compile()` call, never cached across queries.
pub struct CompilationContext<'a> {
    pub schema: &'a dyn Schema,
    pub from: String,
    pub rename: HashMap<String, String>,
}

impl<'a> CompilationContext<'a> {
    pub fn new(schema: &'a dyn Schema, query: &Query) -> Self {
        let rename = schema.leaves(&query.from).into_iter().map(|(path, col)| (path, col.es_column)).collect();
        CompilationContext { schema, from: query.from.clone(), rename }
    }

    pub fn resolve_path(&self, path: &str) -> Result<String> {
        self.rename.get(path).cloned().ok_or_else(|| Error::schema_missing(path))
    }

    pub fn depth_of(&self, path: &str) -> i64 {
        self.schema.columns(&format!("{}.{}", self.from, path)).first().map(|c| c.depth()).unwrap_or(0)
    }
}

pub struct QueryPlanner;

impl QueryPlanner {
    /// Builds one decoder per effective edge, assigns contiguous `start`
    /// offsets in edge order, and returns them ordered root-first
    /// (`decoders[0]` is the outermost aggregation, matching
    /// `get_decoders_by_depth`'s depth-1-to-0 emission order reversed for
    /// construction).
    pub fn plan(query: &Query, ctx: &CompilationContext) -> Result<Vec<Box<dyn Decoder>>> {
        let edges = sort_edges(query, query.effective_edges());
        let mut decoders = Vec::with_capacity(edges.len());
        let mut start = 0usize;
        for edge in &edges {
            let mut decoder = build_decoder(edge, ctx)?;
            decoder.set_start(start);
            start += decoder.num_columns();
            decoders.push(decoder);
        }
        Ok(decoders)
    }
}

/// Mirrors `sort_edges`: an edge named by a `query.sort` clause is
/// pulled to the front in the order the clauses name it, with the
/// realized direction (`resolve_sort_direction`) written back onto its
/// domain so `Decoder::done_count` can honor it when it later realizes
/// an open domain. Edges the sort doesn't mention keep their original
/// relative order, appended after the sorted ones.
fn sort_edges(query: &Query, edges: &[Edge]) -> Vec<Edge> {
    if query.sort.is_empty() {
        return edges.to_vec();
    }

    let mut remaining: Vec<Edge> = edges.to_vec();
    let mut ordered = Vec::with_capacity(edges.len());
    for clause in &query.sort {
        if let Some(pos) = remaining.iter().position(|e| e.name == clause.value) {
            let mut edge = remaining.remove(pos);
            if edge.sort.is_none() {
                edge.sort = Some(clause.dir);
            }
            edge.domain.sort = Some(resolve_sort_direction(&edge));
            ordered.push(edge);
        }
    }
    ordered.extend(remaining);
    ordered
}

fn build_decoder(edge: &Edge, ctx: &CompilationContext) -> Result<Box<dyn Decoder>> {
    match &edge.domain.kind {
        DomainKind::Range { min, max, interval } => {
            let path = edge_var_path(edge, ctx)?;
            let field = ctx.resolve_path(&path)?;
            Ok(Box::new(RangeDecoder::new(edge.clone(), field, *min, *max, *interval)))
        }
        DomainKind::Dimension { fields } => {
            let resolved: Result<Vec<String>> = fields.iter().map(|f| ctx.resolve_path(f)).collect();
            Ok(Box::new(DimFieldListDecoder::new(edge.clone(), resolved?)))
        }
        DomainKind::Set { partitions } => {
            if edge.domain.partitions_all_have_where() {
                let filters = partitions.iter().map(|p| (p.name.clone(), p.where_.as_ref().unwrap().to_esfilter())).collect();
                Ok(Box::new(ObjectDecoder::from_named_filters(edge.clone(), filters)))
            } else {
                let path = edge_var_path(edge, ctx)?;
                let field = ctx.resolve_path(&path)?;
                Ok(Box::new(DefaultDecoder::new(edge.clone(), field)))
            }
        }
        DomainKind::Default => {
            let path = edge_var_path(edge, ctx)?;
            let columns = ctx.schema.columns(&format!("{}.{}", ctx.from, path));
            let is_object = columns.first().map(|c| c.type_tag.is_object_like()).unwrap_or(false);
            if is_object {
                let leaves: Vec<String> = ctx
                    .schema
                    .leaves(&format!("{}.{}", ctx.from, path))
                    .into_iter()
                    .map(|(_, col)| col.es_column)
                    .collect();
                Ok(Box::new(ObjectDecoder::from_leaf_fields(edge.clone(), leaves)))
            } else {
                let field = ctx.resolve_path(&path)?;
                Ok(Box::new(DefaultDecoder::new(edge.clone(), field)))
            }
        }
    }
}

/// Picks the edge's variable path, first checking that every variable
/// its expression references resolves to the same schema depth. An
/// expression mixing a root field with a `tasks.*` field, say, can't be
/// decoded by one aggregation level — the depth it should nest at is
/// ambiguous, so this is rejected rather than silently picking one.
fn edge_var_path(edge: &Edge, ctx: &CompilationContext) -> Result<String> {
    let vars = match &edge.value {
        Some(v) => v.vars(),
        None => return Err(Error::compile(format!("edge {} has no value expression", edge.name))),
    };
    let mut vars = vars.into_iter();
    let first = vars.next().ok_or_else(|| Error::compile(format!("edge {} has no variable reference", edge.name)))?;
    let first_depth = ctx.depth_of(&first);
    for other in vars {
        if ctx.depth_of(&other) != first_depth {
            return Err(Error::spans_tables(&edge.name));
        }
    }
    Ok(first)
}

pub fn resolve_sort_direction(edge: &Edge) -> Dir {
    edge.sort.or(edge.domain.sort).unwrap_or(Dir::Asc)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::Expr;
    use crate::query::SortClause;
    use crate::schema::{Column, MapSchema, TypeTag};

    #[test]
    fn default_domain_resolves_to_default_decoder() {
        let schema = MapSchema::new().with_column("t.status", Column::root("status", TypeTag::String));
        let ctx = CompilationContext::new(&schema, &Query::new("t"));
        let edge = Edge::new("status", Expr::var("status"));
        let d = build_decoder(&edge, &ctx).unwrap();
        assert_eq!(d.num_columns(), 1);
    }

    #[test]
    fn missing_column_is_a_compile_error() {
        let schema = MapSchema::new();
        let ctx = CompilationContext::new(&schema, &Query::new("t"));
        let edge = Edge::new("bogus", Expr::var("bogus"));
        assert!(build_decoder(&edge, &ctx).is_err());
    }

    #[test]
    fn sort_clause_reorders_edges_and_sets_domain_sort() {
        let mut query = Query::new("t");
        query.edges.push(Edge::new("status", Expr::var("status")));
        query.edges.push(Edge::new("region", Expr::var("region")));
        query.sort.push(SortClause { value: "region".to_string(), dir: Dir::Desc });

        let ordered = sort_edges(&query, query.effective_edges());
        assert_eq!(ordered[0].name, "region");
        assert_eq!(ordered[0].domain.sort, Some(Dir::Desc));
        assert_eq!(ordered[1].name, "status");
    }

    #[test]
    fn unmentioned_sort_direction_falls_back_to_edges_own_sort() {
        let mut edge = Edge::new("status", Expr::var("status"));
        edge.sort = Some(Dir::Desc);
        assert_eq!(resolve_sort_direction(&edge), Dir::Desc);
    }

    #[test]
    fn edge_spanning_two_depths_is_rejected() {
        let schema = MapSchema::new()
            .with_column("t.status", Column::root("status", TypeTag::String))
            .with_column("t.tasks.runtime", Column::nested("tasks.runtime", TypeTag::Number, vec!["tasks".to_string(), ".".to_string()]));
        let ctx = CompilationContext::new(&schema, &Query::new("t"));
        let edge = Edge::new("mixed", Expr::Eq(Box::new(Expr::var("status")), Box::new(Expr::var("tasks.runtime"))));
        assert!(build_decoder(&edge, &ctx).is_err());
    }
}
