// Common utilities shared between the discovery pipeline and the
// user-facing macros
//
// This module contains:
// - normalize: Type expression -> canonical name
// - parse_utils: Common parsing helpers

pub mod normalize;
mod parse_utils;

pub use parse_utils::*;
