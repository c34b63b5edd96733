mod features;
mod validate;
mod wide;

pub use features::*;
pub use validate::*;
pub use wide::*;
