pub mod auth;
pub mod availability;
pub mod booking;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod status;
pub mod timefmt;
