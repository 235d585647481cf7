mod convert;
mod resolve;
mod service;
mod variables;
mod warm;

pub use convert::*;
pub use resolve::*;
pub use service::*;
pub use variables::*;
pub use warm::*;
