pub mod app;
pub mod catalog;
pub mod cli;
pub mod collection;
pub mod context;
pub mod error;
pub mod rest;
pub mod storage;
pub mod tracing;
pub mod types;
pub mod visibility;
