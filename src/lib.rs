//! Entity extraction for normalized message bodies.
//!
//! Several independent engines (labeled patterns, a gazetteer, and an
//! optional statistical recognizer) propose candidate spans; a deterministic
//! merger collapses them into one non-overlapping set, and a post-filter
//! chain drops unwanted values and rewrites dates, amounts and codes into
//! canonical form. Every run returns a JSON envelope, even on failure.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod offset;
pub mod types;

pub mod extractors;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::output::ExtractionOutput;
pub use pipeline::Pipeline;
pub use types::{Entity, Source};
