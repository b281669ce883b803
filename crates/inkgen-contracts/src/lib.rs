pub mod accounts;
pub mod events;
pub mod models;
pub mod prompt;
pub mod session;
pub mod upload;
