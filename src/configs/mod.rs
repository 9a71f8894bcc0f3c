pub mod base;
pub mod filters;
pub mod logging;
pub mod route_planner;
pub mod server;
pub mod sources;

pub use base::*;
pub use filters::*;
pub use logging::*;
pub use route_planner::*;
pub use server::*;
pub use sources::*;
