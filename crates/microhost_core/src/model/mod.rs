//! Host-facing data model.
//!
//! # Responsibility
//! - Define what the host loads (`AppDescriptor`) and where it renders.
//! - Define the props contract between orchestrator and app.
//!
//! # See also
//! - `lifecycle::loader` for how descriptors are consumed.

pub mod app;
