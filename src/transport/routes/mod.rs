pub mod info;
pub mod routeplanner;
pub mod tracks;
