//! HTTP surface (spec §6): link management plus the `GET /{shortUri}`
//! redirect, wired up the way the teacher's `api` module splits
//! handlers/routes/state.

mod dto;
mod handlers;
mod routes;
mod state;

pub use routes::build_router;
pub use state::{AppCreator, AppResolver, AppState};
