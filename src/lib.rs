pub mod config;
pub mod crawler;
pub mod domain;
pub mod error;
pub mod genbank;
pub mod ncbi;
pub mod output;
pub mod parser;
pub mod planner;
pub mod store;
