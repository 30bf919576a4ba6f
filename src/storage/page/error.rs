use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Not enough space in page")]
    InsufficientSpace,
    #[error("Tuple not found")]
    TupleNotFound,
    #[error("Invalid record ID")]
    InvalidRecordId,
    #[error("Tuple is marked deleted")]
    TupleDeleted,
}
