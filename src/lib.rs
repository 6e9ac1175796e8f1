//! parley - conversation orchestration core for a multi-tenant AI chat service
//!
//! This library resolves file references into vendor-ready attachments,
//! assembles the system instruction, and drives OpenAI or Gemini through a
//! bounded web-search tool loop with token accounting.

pub mod agent;
pub mod attachments;
pub mod chat;
pub mod config;
pub mod error;
pub mod extraction;
pub mod projects;
pub mod server;
pub mod tools;
pub mod ui;
pub mod usage;

pub use error::{Error, Result};
