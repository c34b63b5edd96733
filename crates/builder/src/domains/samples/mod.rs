mod daily;
mod sample;

pub use daily::*;
pub use sample::*;
