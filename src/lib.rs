pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod layout;
pub mod output;
pub mod pretty;
pub mod split;
pub mod table;
pub mod tools;
