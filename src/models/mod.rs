//! Data models for the wrapped service.
//!
//! Only the envelope is modelled here; resource shapes belong to the
//! call-sites that decode `data`.
//!
//! - [`document`] - Response envelope, links, paging metadata and error bodies

pub mod document;

pub use document::*;
