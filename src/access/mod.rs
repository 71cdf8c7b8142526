//! Access control for the notice board: who the visitor is, and what they may see
//! and do.

pub mod actions;
pub mod audit;
pub mod capability;
pub mod gate;
pub mod resolver;
pub mod role;
pub mod routes;
pub mod session;
