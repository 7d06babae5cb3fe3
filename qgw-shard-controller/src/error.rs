use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed {what} table row: {row:?}")]
    MalformedRow { what: &'static str, row: String },

    #[error("cluster request failed: {0}")]
    Cluster(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
