pub mod dispatcher;

pub use dispatcher::dispatch;
