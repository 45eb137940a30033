//! Request handlers for the annotation methods.

pub mod annotations;

pub use annotations::*;
