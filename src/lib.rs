pub mod backup;
pub mod calc;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod ipc;
pub mod model;
pub mod session;
