mod decode;
mod grid;
mod index;
mod source;

pub use decode::*;
pub use grid::*;
pub use index::*;
pub use source::*;
