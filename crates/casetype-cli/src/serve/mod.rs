pub mod handlers;
pub mod input;
