use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger record serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("ledger record '{barcode}' is corrupt: {reason}")]
    Corrupt { barcode: String, reason: String },

    #[error("invalid ledger barcode '{0}'")]
    InvalidBarcode(String),
}

pub(crate) fn io_error(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> LedgerError {
    let path = path.into();
    move |source| LedgerError::Io { path, source }
}
