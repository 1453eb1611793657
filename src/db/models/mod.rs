mod event;
mod message;
mod registration;
mod user;

pub use event::*;
pub use message::*;
pub use registration::*;
pub use user::*;
