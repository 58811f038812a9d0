//!  Storage is organized through [database::Database].
//!  The basic idea is:
//!   - There is a directory holding one file per collection, trackers and data points.
//!   - Every line of a collection file is a single JSON entity.
//!   - Entities keep their camelCase field names, so exported records load as is, see [entities].

pub mod database;
pub mod entities;
