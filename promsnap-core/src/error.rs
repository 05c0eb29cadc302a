use thiserror::Error;

/// Why a collection pass failed.
///
/// None of these reach `acquire` callers: the coordinator logs the error and
/// publishes an empty snapshot instead, leaving the cache clock unset so the
/// next scrape drives a retry.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("encoded output would exceed the scrape buffer ceiling of {max} bytes")]
    BufferCeiling { max: usize },

    #[error("metrics pipeline returned no records")]
    EmptyBatch,

    #[error("metrics pipeline failed: {0}")]
    Pipeline(#[from] anyhow::Error),
}
