pub mod classifier;
pub mod config;
pub mod input;
pub mod pose;
pub mod protocol;
pub mod server;
pub mod state;
pub mod worker;
