pub mod gfs;

pub use gfs::*;
