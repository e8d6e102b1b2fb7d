//! User-facing macro implementations
//!
//! | Macro | Usage | Purpose |
//! |-------|-------|---------|
//! | `#[capability]` | on trait | Declare a capability, generate `<Trait>Dict` |
//! | `#[derive(Typeable)]` | on struct/enum | Run-time type identity |

pub mod capability;
pub mod typeable;

pub use capability::expand_capability;
pub use typeable::expand_derive_typeable;
