mod exporter;
mod job;
mod long_table;
mod remote;

pub use exporter::*;
pub use job::*;
pub use long_table::*;
pub use remote::*;
