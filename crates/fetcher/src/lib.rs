mod cache;
mod domains;
mod utils;

pub use cache::*;
pub use domains::*;
pub use utils::*;
