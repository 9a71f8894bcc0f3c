pub mod events;
pub mod ops;
pub mod routeplanner;
pub mod stats;
pub mod tracks;

pub use events::*;
pub use ops::{IncomingMessage, Inbound};
pub use routeplanner::*;
pub use stats::*;
pub use tracks::*;
