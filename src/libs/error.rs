use thiserror::Error;

pub type Result<T> = std::result::Result<T, FamilyError>;

/// Errors raised by clustering, family bookkeeping and significance queries.
#[derive(Debug, Error)]
pub enum FamilyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Distance matrix row missing for index {0}")]
    MissingIndex(isize),

    #[error("Distance matrix is not symmetric at ({i}, {j}): {dij} <-> {dji}")]
    AsymmetricMatrix { i: usize, j: usize, dij: f64, dji: f64 },

    #[error("Tree logic error: {0}")]
    Tree(String),

    #[error("No family with id '{0}'")]
    UnknownFamily(String),

    #[error("No item with id '{0}'")]
    UnknownItem(String),

    #[error("Symbol '{0}' is not part of the significance alphabet")]
    UnknownSymbol(String),

    #[error("Can not split family: {0}")]
    CannotSplit(String),

    #[error("No free family id left in the id pool")]
    IdPoolExhausted,

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error("An IO error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A JSON error occurred: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A TOML error occurred: {0}")]
    Toml(#[from] toml::de::Error),
}
