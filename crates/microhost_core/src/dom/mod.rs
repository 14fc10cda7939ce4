//! Minimal host page model.
//!
//! # Responsibility
//! - Represent the subtree an app renders into and the containers it is
//!   placed in.
//! - Expose child-list observation so style blocks can react to late rules.
//!
//! # Invariants
//! - The model is single-threaded; handles are `Rc` and never cross threads.

mod document;
mod element;
mod markup;

pub use document::Document;
pub use element::{ChildListObserver, Element, Node, SHADOW_ROOT_TAG};
pub use markup::{parse_fragment, MarkupError};
