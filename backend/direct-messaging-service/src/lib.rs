pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod websocket;
