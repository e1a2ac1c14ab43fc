//! Model implementations for the routing library.
//!
//! This module provides reference implementations of the `Embedder` and
//! `LanguageModel` traits. Users can use these directly or implement their own.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAI;
