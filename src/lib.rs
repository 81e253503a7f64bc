pub mod config;
pub mod database;
pub mod models;
pub mod startup;
#[cfg(test)]
pub mod test_utils;
pub mod utils;
pub mod web;

pub use utils::state;
