//! Backend adapters
//!
//! One adapter per backend family, each generic over a small client trait so
//! the translation logic is tested against in-memory fakes and the drivers
//! stay at the edge.

pub mod columnar;
pub mod document;
mod errors;
pub mod kv;
pub mod relational;
mod rows;

pub use errors::{BackendError, BackendResult};
pub use rows::RowSet;
