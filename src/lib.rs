//! Sensorpath - a sensor/observation data model over OGC-style resource paths
//!
//! This crate translates hierarchical resource paths such as
//! `/Things(1)/Datastreams(2)/Observations` plus OData-style query options
//! into single relational statements:
//! - Resource path grammar and parser
//! - Data-driven entity/relation metadata registry
//! - Join-graph construction with alias management and join deduplication
//! - Select / count / delete statement emission with windowed pagination
//! - Row-to-entity materialization and relationship mutation

pub mod utils;

pub mod config;
pub mod model;
pub mod persistence;
pub mod query;
pub mod resource_path;
pub mod server;
pub mod sql;
