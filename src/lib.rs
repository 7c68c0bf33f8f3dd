pub mod models;
pub mod db;
pub mod repositories;
pub mod error;
pub mod scorer;
pub mod services;
pub mod tasks;
pub mod utils;

pub use db::Database;
pub use error::Error;
