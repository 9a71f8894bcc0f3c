pub mod app_state;
pub mod outbox;
pub mod registry;
pub mod session;

pub use app_state::AppState;
pub use outbox::{Outbox, SessionState};
pub use registry::{Handshake, PendingResume, SessionRegistry};
pub use session::{ResumeSettings, Session};
