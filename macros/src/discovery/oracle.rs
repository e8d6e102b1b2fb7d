//! The environment oracle.
//!
//! Discovery never looks at source code directly; it asks an [`Oracle`].
//! The macros use [`SourceEnvironment`](super::source::SourceEnvironment);
//! the tests use an in-memory oracle.

use proc_macro2::TokenStream;
use quote::quote;
use syn::Type;

use crate::common::normalize;

/// Capability everything is probed against for run-time type identity.
pub const TYPEABLE: &str = "Typeable";

/// Where a record came from: `file` or `file::module::path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub file: String,
    pub module: Vec<String>,
}

impl Origin {
    pub fn new(file: impl Into<String>, module: Vec<String>) -> Self {
        Origin { file: file.into(), module }
    }

    pub fn location(&self) -> String {
        if self.module.is_empty() {
            self.file.clone()
        } else {
            format!("{}::{}", self.file, self.module.join("::"))
        }
    }
}

/// One implementation of a capability, as the environment reports it.
#[derive(Debug, Clone)]
pub struct ImplementationRecord {
    /// Bounds on the impl's generic parameters and where-clause
    /// predicates, rendered as source text.
    pub preconditions: Vec<String>,
    /// Names of the impl's generic parameters (types, lifetimes, consts).
    pub generic_params: Vec<String>,
    /// The implementing type, as written.
    pub self_ty: Type,
    /// The implementing type, as it resolves from the discovery call site.
    pub path_ty: Type,
    pub origin: Origin,
}

/// Everything the environment can report for a capability query.
#[derive(Debug, Clone)]
pub enum Reported {
    Implementation(ImplementationRecord),
    /// Not shaped like a usable implementation.
    Malformed { name: String, origin: Origin, reason: String },
}

/// Answer to "does this type implement that capability".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    /// The environment cannot tell; the type checker decides later.
    Deferred,
}

/// Fatal query failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("capability `{name}` not found: no trait declaration and no implementations in {roots}")]
    MissingCapability { name: String, roots: String },

    #[error("trait `{name}` is not a capability: mark its declaration in {location} with `#[tola_evidence::capability]`")]
    NotACapability { name: String, location: String },

    #[error("cannot resolve `CARGO_MANIFEST_DIR`: {0}")]
    NoManifestDir(String),
}

/// Compile-time reflection queries.
pub trait Oracle {
    /// Every visible implementation of `capability`, in environment order.
    fn enumerate_implementations(&self, capability: &str) -> Result<Vec<Reported>, DiscoveryError>;

    /// Whether `ty` implements `capability`.
    fn is_implemented_for(&self, capability: &str, ty: &Type) -> Answer;

    /// Canonical name of a type expression.
    fn normalize(&self, ty: &Type) -> String {
        normalize::canonical_name(ty)
    }

    /// Expression yielding `ty`'s identity resolver. Only asked after
    /// [`Oracle::is_implemented_for`] answered [`Answer::Yes`] for
    /// [`TYPEABLE`].
    fn type_identity_of(&self, ty: &Type) -> TokenStream {
        quote! { ::tola_evidence::TypeIdentity::of::<#ty> as ::tola_evidence::IdentityFn }
    }
}
