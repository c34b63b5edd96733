mod export;
mod forecasts;
mod reshape;
mod samples;
mod water_quality;

pub use export::*;
pub use forecasts::*;
pub use reshape::*;
pub use samples::*;
pub use water_quality::*;
