//! Data shapes flowing through one save call.
//!
//! # Responsibility
//! - `entity`: rows as attribute maps, the root entity being saved.
//! - `payload`: nested relation payload parsed from JSON-like input.
//!
//! # Invariants
//! - Attribute maps never carry relation payload entries after extraction.
//! - Payload values are parsed once per save call and dropped with it.

pub mod entity;
pub mod payload;
