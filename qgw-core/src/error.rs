use thiserror::Error;

/// Error taxonomy from the design's error handling section. The compiler
/// raises `Compile`/`Format` eagerly (fail fast, never emit an invalid
/// aggregation); `Upstream` wraps whatever the transport collaborator
/// returns; `SchemaTimeout` is surfaced by the metadata-wait cooperative
/// loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    Compile { message: String },

    #[error("Format {format:?} not supported yet")]
    Format { format: String },

    #[error("upstream request failed: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error("metadata wait exceeded policy bound")]
    SchemaTimeout,
}

impl Error {
    pub fn compile<S: Into<String>>(message: S) -> Self {
        Error::Compile { message: message.into() }
    }

    pub fn schema_missing(var: &str) -> Self {
        Error::compile(format!("{} does not exist in schema", var))
    }

    pub fn spans_tables(expr_name: &str) -> Self {
        Error::compile(format!("expression {} spans tables, can not handle", expr_name))
    }

    pub fn where_too_deep() -> Self {
        Error::compile("where clause is too deep")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
