pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod password;
pub mod repository;
pub mod rest;
pub mod validate;
