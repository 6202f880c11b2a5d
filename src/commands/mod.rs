//! Command implementations for vecbench

pub mod config;
pub mod dispatch;
pub mod format;
pub mod run;
