//! Library exports for the movie reviews API
//!
//! This module exposes internal components for testing and potential library usage.

pub mod config;
pub mod dao;
pub mod database;
pub mod error;
pub mod handler;
pub mod model;
pub mod query;
pub mod route;
pub mod seed;
