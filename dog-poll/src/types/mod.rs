pub mod ids;
pub mod status;
pub mod request;
pub mod events;

pub use ids::{SessionId, TaskId};
pub use status::Status;
pub use request::PollRequest;
pub use events::{PollEvent, RetryReason};
