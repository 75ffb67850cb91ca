pub mod connctx;
pub mod handler;
pub mod hub;
