//! # mdfe-document — Canonical Document Builder
//!
//! Turns the transport manifest domain model into the canonical
//! serialized form that gets signed, and parses summaries back out of
//! stored forms for display and audit.
//!
//! - [`model`] — the domain payload: issuer, route, cargo, conveyance,
//!   drivers, linked fiscal documents.
//! - [`assembler`] — [`assemble()`] renders the model into the
//!   byte-deterministic canonical form with the access key embedded;
//!   [`extract_summary()`] reads the headline fields back without
//!   re-running full validation.

pub mod assembler;
pub mod model;

pub use assembler::{assemble, extract_summary, AssemblyError, ManifestSummary, LAYOUT_VERSION};
pub use model::{CargoInfo, Driver, Issuer, LinkedDocument, Manifest, Route, Vehicle, WeightUnit};
