//! The read-only schema oracle. Treated as an external collaborator per
//! the design (§1): the planner only ever calls `Schema::columns`, never
//! mutates or caches beyond the lifetime of one `CompilationContext`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Object,
    Nested,
}

impl TypeTag {
    pub fn is_object_like(self) -> bool {
        matches!(self, TypeTag::Object | TypeTag::Nested)
    }
}

/// One physical column backing a logical path. `nested_path` is
/// deepest-first (the innermost nested path the column lives under comes
/// first); its length minus one is the column's nested depth, with depth
/// 0 meaning the root document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub es_column: String,
    pub type_tag: TypeTagKind,
    pub nested_path: Vec<String>,
}

/// `TypeTag` isn't `Eq` (floats aside, it is, but keeping the alias gives
/// callers a stable name if number kinds grow variants later).
pub type TypeTagKind = TypeTag;

impl Column {
    pub fn root<S: Into<String>>(es_column: S, type_tag: TypeTag) -> Self {
        Column { es_column: es_column.into(), type_tag, nested_path: vec![".".to_string()] }
    }

    pub fn nested<S: Into<String>>(es_column: S, type_tag: TypeTag, nested_path: Vec<String>) -> Self {
        Column { es_column: es_column.into(), type_tag, nested_path }
    }

    /// `len(nested_path) - 1`; an empty `nested_path` (should not occur
    /// for a resolved column) is treated as depth 0, matching the
    /// original's "schema is empty, assume simple query" fallback.
    pub fn depth(&self) -> i64 {
        (self.nested_path.len() as i64) - 1
    }
}

/// `path -> list<Column>`. A path with no matching columns returns an
/// empty slice, which the planner treats as a `SchemaError` (`Compile`)
/// except where the design explicitly allows a depth-0 fallback.
pub trait Schema: Send + Sync {
    fn columns(&self, path: &str) -> Vec<Column>;

    /// All leaf columns under `from`, used to build the `path ->
    /// es_column` rewrite map the planner applies before compilation.
    fn leaves(&self, from: &str) -> Vec<(String, Column)>;
}

/// A simple in-memory schema, good enough for tests and small
/// deployments where the schema is hand-authored rather than discovered.
#[derive(Debug, Default, Clone)]
pub struct MapSchema {
    columns: HashMap<String, Vec<Column>>,
}

impl MapSchema {
    pub fn new() -> Self {
        MapSchema { columns: HashMap::new() }
    }

    pub fn with_column(mut self, path: impl Into<String>, column: Column) -> Self {
        self.columns.entry(path.into()).or_default().push(column);
        self
    }
}

impl Schema for MapSchema {
    fn columns(&self, path: &str) -> Vec<Column> {
        self.columns.get(path).cloned().unwrap_or_default()
    }

    fn leaves(&self, from: &str) -> Vec<(String, Column)> {
        self.columns
            .iter()
            .filter(|(p, _)| p.as_str() == from || p.starts_with(&format!("{}.", from)))
            .flat_map(|(p, cols)| cols.iter().map(move |c| (p.clone(), c.clone())))
            .collect()
    }
}

pub fn split_field(path: &str) -> Vec<&str> {
    path.split('.').collect()
}
