//! Splits a `where` expression into one fragment per nested depth, so the
//! compiler can attach each clause to the aggregation level it's actually
//! expressible at instead of forcing every filter to the root (§4.4).

use crate::expr::Expr;
use crate::schema::Schema;

pub struct WhereSplitter;

impl WhereSplitter {
    /// Flattens the top-level `And` (a bare non-`And` expression is
    /// treated as a one-clause conjunction) and buckets each clause by
    /// the deepest nested depth any variable it references lives at.
    /// Returns one `Expr` per depth, `0..=max_depth`, `Expr::Null` where
    /// no clause landed. A clause referencing columns at more than one
    /// depth is pinned to the deepest of them — it can only be evaluated
    /// once that nesting level's documents are visible.
    pub fn split(where_: &Expr, schema: &dyn Schema, from: &str) -> Vec<Expr> {
        let clauses = flatten_and(where_);
        let mut max_depth = 0i64;
        let mut by_depth: Vec<Vec<Expr>> = vec![];

        for clause in &clauses {
            let depth = clause_depth(clause, schema, from);
            max_depth = max_depth.max(depth);
            while by_depth.len() <= depth as usize {
                by_depth.push(vec![]);
            }
            by_depth[depth as usize].push(clause.clone());
        }
        while by_depth.len() <= max_depth as usize {
            by_depth.push(vec![]);
        }

        by_depth
            .into_iter()
            .map(|cs| match cs.len() {
                0 => Expr::Null,
                1 => cs.into_iter().next().unwrap(),
                _ => Expr::And(cs),
            })
            .collect()
    }
}

fn flatten_and(e: &Expr) -> Vec<Expr> {
    match e {
        Expr::Null => vec![],
        Expr::And(cs) => cs.iter().flat_map(flatten_and).collect(),
        other => vec![other.clone()],
    }
}

fn clause_depth(clause: &Expr, schema: &dyn Schema, from: &str) -> i64 {
    clause
        .vars()
        .iter()
        .map(|path| schema.columns(&format!("{}.{}", from, path)).into_iter().map(|c| c.depth()).max().unwrap_or(0))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::{Column, MapSchema, TypeTag};
    use serde_json::json;

    #[test]
    fn root_only_clause_lands_at_depth_zero() {
        let schema = MapSchema::new().with_column("t.status", Column::root("status", TypeTag::String));
        let where_ = Expr::Eq(Box::new(Expr::var("status")), Box::new(Expr::Literal(json!("open"))));
        let split = WhereSplitter::split(&where_, &schema, "t");
        assert_eq!(split.len(), 1);
        assert_eq!(split[0], where_);
    }

    #[test]
    fn nested_clause_lands_at_its_depth() {
        let schema = MapSchema::new()
            .with_column("t.status", Column::root("status", TypeTag::String))
            .with_column("t.tasks.runtime", Column::nested("tasks.runtime", TypeTag::Number, vec!["tasks".to_string(), ".".to_string()]));
        let where_ = Expr::And(vec![
            Expr::Eq(Box::new(Expr::var("status")), Box::new(Expr::Literal(json!("open")))),
            Expr::Gt(Box::new(Expr::var("tasks.runtime")), Box::new(Expr::Literal(json!(60)))),
        ]);
        let split = WhereSplitter::split(&where_, &schema, "t");
        assert_eq!(split.len(), 2);
        assert!(matches!(split[0], Expr::Eq(..)));
        assert!(matches!(split[1], Expr::Gt(..)));
    }
}
