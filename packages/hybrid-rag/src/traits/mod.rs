//! Collaborator contracts.
//!
//! These traits define the interfaces that applications implement to
//! provide search backends, entity extraction, embeddings, and completions.

pub mod backend;
pub mod model;
