#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

mod batch;
pub mod data;
mod db;
pub mod error;
pub mod fio;
pub mod index;
mod iterator;
mod merge;
pub mod options;

pub use batch::WriteBatch;
pub use data::{LogRecordPos, LogRecordType};
pub use db::Engine;
pub use error::{Error, Result};
pub use index::{IndexIterator, Indexer};
pub use iterator::EngineIterator;
pub use options::{IndexType, IteratorOptions, Options, Stat, WriteBatchOptions};
