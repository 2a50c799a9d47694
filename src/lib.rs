pub mod common;
pub mod config;

// Calendar domain: showtime resolution, snapshot building, merging
pub mod calendar;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub mod observability;
