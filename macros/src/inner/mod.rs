//! Internal macros used by the tola-evidence crate itself.

pub mod std_types;
