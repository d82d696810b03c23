//! Application layer: the transition protocol (writes) and the view
//! projector (reads).

pub mod command_handlers;
pub mod query_handlers;
