mod forecast_data;
pub mod routes;
mod startup;
mod utils;

pub use forecast_data::*;
pub use routes::*;
pub use startup::*;
pub use utils::*;
