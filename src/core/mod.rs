//! Infrastructure shared by the engine subsystems: the store handle, the
//! DB broker thin waist, schema DDL, errors, config, and time helpers.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod schemas;
pub mod store;
pub mod time;
