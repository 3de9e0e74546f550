pub mod db;
pub mod guard;
pub mod schema;
pub mod statement;

pub use sqlparser;
