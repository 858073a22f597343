#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Couldn't find column '{0}'")]
    UnknownColumn(String),

    #[error("Column id {column_id} out of range, table has {column_count} columns")]
    ColumnIdOutOfRange {
        column_id: usize,
        column_count: usize,
    },

    #[error("Chunk id {chunk_id} out of range, table has {chunk_count} chunks")]
    ChunkIdOutOfRange { chunk_id: u32, chunk_count: usize },

    #[error("Chunk offset {offset} out of bounds for segment of length {len}")]
    OffsetOutOfBounds { offset: u32, len: usize },

    #[error("Segments in a chunk must have equal lengths; have {have}, expected {expected}")]
    SegmentLengthMismatch { have: usize, expected: usize },

    #[error("Invalid segment kind: {0}")]
    SegmentTypeMismatch(String),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
