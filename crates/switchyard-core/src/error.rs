use crate::ir::IrError;

/// A `Result` alias where the `Err` case is `switchyard_core::Error`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid yaml: {0}")]
    InvalidYaml(#[from] serde_yml::Error),

    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed to load resources: {0}")]
    Load(#[from] switchyard_api::Error),

    #[error("[{index}]: invalid {kind}: {source}")]
    InvalidResource {
        index: usize,
        kind: String,
        source: serde_json::Error,
    },

    #[error("invalid policy {policy}: {source}")]
    InvalidPolicy {
        policy: String,
        source: switchyard_api::Error,
    },

    #[error("invalid IR {key}: {source}")]
    Ir { key: String, source: IrError },
}
