use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid UTF-8 text", path.display())]
    Decode { path: PathBuf },

    #[error("index state at {} is corrupt: {source}", path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Process exit code for this error kind.
    ///
    /// | code | kind                         |
    /// |------|------------------------------|
    /// | 3    | I/O                          |
    /// | 4    | corrupt index state          |
    /// | 5    | embedding provider           |
    /// | 6    | vector index storage         |
    /// | 7    | text decode                  |
    /// | 8    | configuration / data dir     |
    /// | 1    | anything else                |
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Io(_) | Error::Read { .. } => 3,
            Error::CorruptState { .. } => 4,
            Error::Embedding(_) => 5,
            Error::DimensionMismatch { .. }
            | Error::Redb(_)
            | Error::RedbDatabase(_)
            | Error::RedbStorage(_)
            | Error::RedbTransaction(_)
            | Error::RedbTable(_)
            | Error::RedbCommit(_) => 6,
            Error::Decode { .. } => 7,
            Error::Config(_) | Error::DataDir(_) => 8,
            Error::Serialize(_) | Error::NotFound { .. } => 1,
        }
    }
}

impl From<candle_core::Error> for Error {
    fn from(e: candle_core::Error) -> Self {
        Error::Embedding(format!("tensor computation error: {e}"))
    }
}
