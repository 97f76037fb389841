//! Sandwich symmetry evaluator.
//!
//! An upload is cropped to the sandwich (bounding box from a vision model),
//! scored for left/right mirror symmetry, checked for actually being a
//! sandwich, and roasted by a language model. Accepted results are kept per
//! user with a thumbnail.

pub mod classification;
pub mod config;
pub mod critique;
pub mod error;
pub mod locator;
pub mod oracle;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod symmetry;
