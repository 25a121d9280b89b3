//! Database entity models for the Leadflow API.

pub mod lead;

pub use lead::{Lead, LeadResponse, LeadSource, LeadStatus};
