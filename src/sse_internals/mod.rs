pub mod cache;
pub mod config;
pub mod deletion;
pub mod error;
pub mod orchestrator;
pub mod params;
pub mod prf;
pub mod punct;
pub mod request;
pub mod store;
pub mod tdp;
pub mod token_tree;
pub mod workers;
