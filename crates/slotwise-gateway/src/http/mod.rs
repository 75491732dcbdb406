pub mod appointments;
pub mod auth;
pub mod catalog;
pub mod cron;
pub mod error;
pub mod health;
pub mod settings;
