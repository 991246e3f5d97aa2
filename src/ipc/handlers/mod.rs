pub mod attendance;
pub mod auth;
pub mod backup_exchange;
pub mod core;
pub mod entities;
pub mod fees;
pub mod mirror;
pub mod students;
