//! Core functionality for stored files, auto-save, and configuration

pub mod autosave;
pub mod clock;
pub mod config;
pub mod document;
pub mod file_system;
pub mod files;
pub mod storage;
pub mod store;
