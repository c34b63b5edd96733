pub mod clock;
mod domains;
mod object_store;
mod parquet_handler;
mod pipeline;
#[cfg(feature = "s3")]
mod s3_storage;
mod utils;

pub use domains::*;
pub use object_store::*;
pub use parquet_handler::*;
pub use pipeline::*;
#[cfg(feature = "s3")]
pub use s3_storage::*;
pub use utils::*;
