//! The query planner and `where` splitter consume a pre-parsed, validated
//! expression tree; the real system defers to an external expression
//! library for parsing and painless-lowering. No such crate exists in
//! this workspace, so this module stands in for it: a minimal algebraic
//! tree carrying exactly the operations the planner/builder/filter
//! machinery calls (`vars`, `map`, `to_esfilter`, `to_painless`).

use std::collections::BTreeSet;

use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Variable(String),
    Literal(Value),
    Null,
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Lte(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Gte(Box<Expr>, Box<Expr>),
    Tuple(Vec<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

/// What `to_painless()` yields: a scripted field, ready to drop straight
/// into an aggregation node (`es_query.aggs[key].percentiles.script`).
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub script: String,
}

impl Expr {
    pub fn var<S: Into<String>>(name: S) -> Self {
        Expr::Variable(name.into())
    }

    pub fn is_null_op(&self) -> bool {
        matches!(self, Expr::Null)
    }

    /// The set of variable paths this expression references, recursively.
    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Variable(v) => {
                out.insert(v.clone());
            }
            Expr::Literal(_) | Expr::Null => {}
            Expr::And(cs) | Expr::Or(cs) | Expr::Tuple(cs) => {
                for c in cs {
                    c.collect_vars(out);
                }
            }
            Expr::Eq(a, b)
            | Expr::Ne(a, b)
            | Expr::Lt(a, b)
            | Expr::Lte(a, b)
            | Expr::Gt(a, b)
            | Expr::Gte(a, b)
            | Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
        }
    }

    /// Renames every `Variable` leaf through `rename`, leaving unmapped
    /// variables untouched. Used to rewrite query-side variable names to
    /// their `es_column` counterparts before compilation.
    pub fn map(&self, rename: &std::collections::HashMap<String, String>) -> Expr {
        match self {
            Expr::Variable(v) => Expr::Variable(rename.get(v).cloned().unwrap_or_else(|| v.clone())),
            Expr::Literal(l) => Expr::Literal(l.clone()),
            Expr::Null => Expr::Null,
            Expr::And(cs) => Expr::And(cs.iter().map(|c| c.map(rename)).collect()),
            Expr::Or(cs) => Expr::Or(cs.iter().map(|c| c.map(rename)).collect()),
            Expr::Tuple(cs) => Expr::Tuple(cs.iter().map(|c| c.map(rename)).collect()),
            Expr::Eq(a, b) => Expr::Eq(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Ne(a, b) => Expr::Ne(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Lt(a, b) => Expr::Lt(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Lte(a, b) => Expr::Lte(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Gt(a, b) => Expr::Gt(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Gte(a, b) => Expr::Gte(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Add(a, b) => Expr::Add(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Sub(a, b) => Expr::Sub(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Mul(a, b) => Expr::Mul(Box::new(a.map(rename)), Box::new(b.map(rename))),
            Expr::Div(a, b) => Expr::Div(Box::new(a.map(rename)), Box::new(b.map(rename))),
        }
    }

    /// Lowers a boolean expression into an Elasticsearch query-DSL filter
    /// fragment. `simplify_esfilter` (in `where_splitter`) collapses the
    /// trivial cases this produces (single-clause `bool.must`, etc).
    pub fn to_esfilter(&self) -> Value {
        match self {
            Expr::Null => json!({"match_all": {}}),
            Expr::And(cs) => json!({"bool": {"must": cs.iter().map(Expr::to_esfilter).collect::<Vec<_>>()}}),
            Expr::Or(cs) => json!({"bool": {"should": cs.iter().map(Expr::to_esfilter).collect::<Vec<_>>()}}),
            Expr::Eq(a, b) => term_filter(a, b),
            Expr::Ne(a, b) => json!({"bool": {"must_not": [term_filter(a, b)]}}),
            Expr::Lt(a, b) => range_filter(a, b, "lt"),
            Expr::Lte(a, b) => range_filter(a, b, "lte"),
            Expr::Gt(a, b) => range_filter(a, b, "gt"),
            Expr::Gte(a, b) => range_filter(a, b, "gte"),
            Expr::Tuple(cs) => json!({"bool": {"must": cs.iter().map(Expr::to_esfilter).collect::<Vec<_>>()}}),
            // Arithmetic has no boolean meaning; script it and test truthiness.
            _ => json!({"script": {"script": self.to_painless().script}}),
        }
    }

    /// Lowers an arbitrary expression into a painless script fragment,
    /// the way the real expression library's `to_painless()` would.
    pub fn to_painless(&self) -> Script {
        Script { script: self.painless_string() }
    }

    fn painless_string(&self) -> String {
        match self {
            Expr::Variable(v) => format!("doc['{}'].value", v),
            Expr::Literal(l) => l.to_string(),
            Expr::Null => "null".to_string(),
            Expr::Add(a, b) => format!("({} + {})", a.painless_string(), b.painless_string()),
            Expr::Sub(a, b) => format!("({} - {})", a.painless_string(), b.painless_string()),
            Expr::Mul(a, b) => format!("({} * {})", a.painless_string(), b.painless_string()),
            Expr::Div(a, b) => format!("({} / {})", a.painless_string(), b.painless_string()),
            Expr::Eq(a, b) => format!("({} == {})", a.painless_string(), b.painless_string()),
            Expr::Ne(a, b) => format!("({} != {})", a.painless_string(), b.painless_string()),
            Expr::Lt(a, b) => format!("({} < {})", a.painless_string(), b.painless_string()),
            Expr::Lte(a, b) => format!("({} <= {})", a.painless_string(), b.painless_string()),
            Expr::Gt(a, b) => format!("({} > {})", a.painless_string(), b.painless_string()),
            Expr::Gte(a, b) => format!("({} >= {})", a.painless_string(), b.painless_string()),
            Expr::And(cs) => join_painless(cs, "&&"),
            Expr::Or(cs) => join_painless(cs, "||"),
            Expr::Tuple(cs) => format!("[{}]", cs.iter().map(Expr::painless_string).collect::<Vec<_>>().join(", ")),
        }
    }
}

fn join_painless(cs: &[Expr], op: &str) -> String {
    format!("({})", cs.iter().map(Expr::painless_string).collect::<Vec<_>>().join(&format!(" {} ", op)))
}

fn term_filter(a: &Expr, b: &Expr) -> Value {
    match (a, b) {
        (Expr::Variable(v), Expr::Literal(l)) | (Expr::Literal(l), Expr::Variable(v)) => {
            json!({"term": {v.clone(): l.clone()}})
        }
        _ => json!({"script": {"script": Expr::Eq(Box::new(a.clone()), Box::new(b.clone())).painless_string()}}),
    }
}

fn range_filter(a: &Expr, b: &Expr, op: &str) -> Value {
    match (a, b) {
        (Expr::Variable(v), Expr::Literal(l)) => json!({"range": {v.clone(): {op: l.clone()}}}),
        (Expr::Literal(l), Expr::Variable(v)) => {
            let flipped = match op {
                "lt" => "gt",
                "lte" => "gte",
                "gt" => "lt",
                "gte" => "lte",
                other => other,
            };
            json!({"range": {v.clone(): {flipped: l.clone()}}})
        }
        _ => json!({"script": {"script": a.painless_string()}}),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vars_collects_recursively() {
        let e = Expr::And(vec![
            Expr::Gt(Box::new(Expr::var("tasks.runtime")), Box::new(Expr::Literal(json!(60)))),
            Expr::Eq(Box::new(Expr::var("status")), Box::new(Expr::Literal(json!("done")))),
        ]);
        let vars = e.vars();
        assert!(vars.contains("tasks.runtime"));
        assert!(vars.contains("status"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn map_renames_variables_only() {
        let e = Expr::Eq(Box::new(Expr::var("a")), Box::new(Expr::Literal(json!(1))));
        let mut rename = std::collections::HashMap::new();
        rename.insert("a".to_string(), "a_raw".to_string());
        let mapped = e.map(&rename);
        assert_eq!(mapped.vars().into_iter().collect::<Vec<_>>(), vec!["a_raw".to_string()]);
    }

    #[test]
    fn to_esfilter_term() {
        let e = Expr::Eq(Box::new(Expr::var("status")), Box::new(Expr::Literal(json!("done"))));
        assert_eq!(e.to_esfilter(), json!({"term": {"status": "done"}}));
    }

    #[test]
    fn to_esfilter_range() {
        let e = Expr::Gt(Box::new(Expr::var("tasks.runtime")), Box::new(Expr::Literal(json!(60))));
        assert_eq!(e.to_esfilter(), json!({"range": {"tasks.runtime": {"gt": 60}}}));
    }
}
