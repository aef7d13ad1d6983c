//! Background finalization of ended conversations.

pub mod dispatcher;

pub use dispatcher::{DispatchError, FinalizeDispatcher, FinalizeJob};
