#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod blob_store;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;
