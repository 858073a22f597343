#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Storage(#[from] sylvite_storage::errors::StorageError),

    #[error("Query canceled")]
    QueryCanceled,
}

pub type Result<T, E = ExecutionError> = std::result::Result<T, E>;
