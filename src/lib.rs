//! Turn spoken or typed requests into SQL for a SQLite, MySQL or PostgreSQL database, and run it.
//!
//! A request flows through three stages, all on one connection:
//!
//! 1. [`introspect`] reads the database schema,
//! 2. [`synthesize`] asks a [`ChatModel`](model::ChatModel) to turn the request into a query,
//! 3. [`execute`] runs the query and materializes a [`ResultTable`](table::ResultTable).
//!
//! [`pipeline::Pipeline`] strings the stages together.

pub mod chart;
pub mod connection;
pub mod error;
pub mod execute;
pub mod introspect;
pub mod model;
pub mod openai;
pub mod pipeline;
pub mod profile;
pub mod synthesize;
pub mod table;

pub use error::{Error, Result, SynthesisError};
pub use voxql_sqlparse::{
    db::Dialect,
    guard::{ReadOnlyVerdict, check_read_only},
    schema::{CondensedSchema, ForeignKey, IMPLICIT_PRIMARY_KEY},
};

pub use sqlx;
