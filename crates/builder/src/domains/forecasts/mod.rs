mod aggregator;
mod archive;
mod config;
mod labels;
mod record;
mod selector;

pub use aggregator::*;
pub use archive::*;
pub use config::*;
pub use labels::*;
pub use record::*;
pub use selector::*;
