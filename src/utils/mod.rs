//! Shared utility functions for task-finalizer.
//!
//! Currently only JSON extraction from free-text LLM replies.

pub mod json_extraction;

pub use json_extraction::{extract_json_objects, JsonExtractionError};
