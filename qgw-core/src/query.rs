use serde_derive::{Deserialize, Serialize};

use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Stats,
    Median,
    Percentile,
    Cardinality,
    Union,
    None,
}

impl Default for AggKind {
    fn default() -> Self {
        AggKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Cube,
    Table,
    List,
}

impl Default for Format {
    fn default() -> Self {
        Format::List
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectClause {
    pub name: String,
    pub value: Expr,
    #[serde(default)]
    pub aggregate: AggKind,
    pub percentile: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Range {
    pub min: Expr,
    pub max: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    #[serde(rename = "where")]
    pub where_: Option<Expr>,
}

/// Mirrors the design's `Domain` variants. `DefaultDomain` is the open
/// set enumerated from observed buckets during result-walking; the
/// others are all closed at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DomainKind {
    Default,
    Range { min: f64, max: f64, interval: f64 },
    Set { partitions: Vec<Partition> },
    Dimension { fields: Vec<String> },
}

impl Default for DomainKind {
    fn default() -> Self {
        DomainKind::Default
    }
}

/// `sort` here is the realized sort direction `sort_edges` (§4.1 step 2)
/// writes back onto the domain, distinct from `Edge::sort` which is the
/// query's originally-requested direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Domain {
    #[serde(flatten)]
    pub kind: DomainKind,
    #[serde(default)]
    pub sort: Option<Dir>,
}

impl Domain {
    pub fn default_domain() -> Self {
        Domain { kind: DomainKind::Default, sort: None }
    }

    pub fn dimension(fields: Vec<String>) -> Self {
        Domain { kind: DomainKind::Dimension { fields }, sort: None }
    }

    pub fn partitions_all_have_where(&self) -> bool {
        match &self.kind {
            // Open question in the design: "all partitions have a
            // non-null where" is the predicate we apply.
            DomainKind::Set { partitions } => !partitions.is_empty() && partitions.iter().all(|p| p.where_.is_some()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub name: String,
    pub value: Option<Expr>,
    #[serde(default)]
    pub domain: Domain,
    pub range: Option<Range>,
    #[serde(default)]
    pub allow_nulls: bool,
    pub sort: Option<Dir>,
}

impl Edge {
    pub fn new<S: Into<String>>(name: S, value: Expr) -> Self {
        Edge {
            name: name.into(),
            value: Some(value),
            domain: Domain::default_domain(),
            range: None,
            allow_nulls: false,
            sort: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortClause {
    pub value: String,
    pub dir: Dir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub from: String,
    #[serde(default)]
    pub select: Vec<SelectClause>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub groupby: Vec<Edge>,
    #[serde(default = "Expr::default_where")]
    pub where_: Expr,
    #[serde(default)]
    pub sort: Vec<SortClause>,
    #[serde(default)]
    pub format: Format,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// `meta.testing` from §5: block compilation on a schema poll.
    #[serde(default)]
    pub meta_testing: bool,
}

fn default_limit() -> usize {
    10_000
}

impl Expr {
    pub fn default_where() -> Expr {
        Expr::Null
    }
}

impl Query {
    pub fn new<S: Into<String>>(from: S) -> Self {
        Query {
            from: from.into(),
            select: vec![],
            edges: vec![],
            groupby: vec![],
            where_: Expr::Null,
            sort: vec![],
            format: Format::List,
            limit: default_limit(),
            meta_testing: false,
        }
    }

    /// A query is an aggregation iff it has any edge, any groupby entry,
    /// or any select clause whose aggregate isn't `none`.
    pub fn is_aggregating(&self) -> bool {
        !self.edges.is_empty()
            || !self.groupby.is_empty()
            || self.select.iter().any(|s| s.aggregate != AggKind::None)
    }

    /// The effective edge list for planning: `edges` take priority over
    /// `groupby` when both are present, per the design's note that
    /// they're "mutually exclusive with edges in effect".
    pub fn effective_edges(&self) -> &[Edge] {
        if !self.edges.is_empty() {
            &self.edges
        } else {
            &self.groupby
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aggregating_detection() {
        let mut q = Query::new("t");
        assert!(!q.is_aggregating());

        q.edges.push(Edge::new("a", Expr::var("a")));
        assert!(q.is_aggregating());

        let mut q2 = Query::new("t");
        q2.select.push(SelectClause { name: "c".into(), value: Expr::var("."), aggregate: AggKind::Count, percentile: None, limit: None });
        assert!(q2.is_aggregating());
    }

    #[test]
    fn effective_edges_prefers_edges_over_groupby() {
        let mut q = Query::new("t");
        q.groupby.push(Edge::new("g", Expr::var("g")));
        assert_eq!(q.effective_edges().len(), 1);
        q.edges.push(Edge::new("e", Expr::var("e")));
        assert_eq!(q.effective_edges()[0].name, "e");
    }
}
