//! Per-request context types: who is asking (user) and how (request).
//! Keep the public surface thin and split implementation across sub-modules.

mod request_context;
mod session;
mod user_context;

pub use request_context::RequestContext;
pub use session::{Session, SessionManager, SessionToken};
pub use user_context::{UserContext, UserKind};
