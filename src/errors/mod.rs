pub mod types;

pub use types::{AppError, SourceError};

pub type AppResult<T> = Result<T, AppError>;
