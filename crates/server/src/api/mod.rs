pub mod catalog;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod previews;
pub mod routes;
pub mod session;
pub mod ws;

pub use routes::create_router;
pub use ws::{forward_job_events, WsBroadcaster, WsMessage};
