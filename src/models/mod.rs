//! Domain model module declarations.

pub mod ignored;
pub mod task;
pub mod user;

pub use ignored::IgnoredAlert;
pub use task::{NewAlert, Task, TaskStatus};
pub use user::ChatUser;
