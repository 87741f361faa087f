pub mod app;
pub mod handlers;
pub mod responses;
pub mod state;
