pub mod config;
pub mod device;
pub mod error;
pub mod selection;
pub mod state;
