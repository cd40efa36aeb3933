//! Shared types for the flowcap capture pipeline.

mod critical;
mod event;
mod feed;
mod recording;
mod session;

pub use critical::*;
pub use event::*;
pub use feed::*;
pub use recording::*;
pub use session::*;
