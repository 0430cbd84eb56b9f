//! Shared utility functions for neuroadapt.
//!
//! This module provides JSON extraction from LLM responses.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_object, find_matching_brace, ExtractedJson, JsonExtractionError,
};
