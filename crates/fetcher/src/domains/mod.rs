pub mod forecasts;
pub mod gfs;

pub use forecasts::*;
pub use gfs::*;
