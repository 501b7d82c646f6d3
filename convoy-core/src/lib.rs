//! Convoy Core
//!
//! Core types and abstractions for the Convoy deployment pipeline engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, PipelineRun, etc.)
//! - DTOs: Request and summary objects exchanged with embedding surfaces

pub mod domain;
pub mod dto;
