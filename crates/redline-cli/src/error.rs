#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
pub enum Error {
    #[error("{failed} of {total} files could not be extracted")]
    BatchFailed { failed: usize, total: usize },

    #[error("Not a file path: {0}")]
    BadPath(String),
}
