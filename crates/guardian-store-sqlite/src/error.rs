//! Error type for `guardian-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// The query or write named a table the schema does not have.
  #[error("unknown table: {0:?}")]
  UnknownTable(String),

  #[error("unknown column {column:?} on table {table:?}")]
  UnknownColumn { table: String, column: String },

  /// An insert carried no column the table knows about.
  #[error("row for table {0:?} has no known columns")]
  EmptyRow(String),

  #[error("an authenticated session is required")]
  Unauthorized,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
