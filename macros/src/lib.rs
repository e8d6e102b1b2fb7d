//! Procedural macros for tola-evidence
//!
//! # Macro API
//!
//! | Macro | Target | Purpose |
//! |-------|--------|---------|
//! | `#[capability]` | trait | Declare a capability |
//! | `#[derive(Typeable)]` | struct/enum | Run-time type identity |
//! | `discover!()` | expression | Evidence for every implementation |
//! | `discover_with_metadata!()` | expression | Evidence plus name and identity |
//! | `skipped_instances!()` | expression | Implementations that were not packaged |
//!
//! ## Example
//!
//! ```ignore
//! // 1. Declare a capability
//! #[capability]
//! pub trait Describable {
//!     fn describe() -> String;
//! }
//!
//! // 2. Implement it anywhere under `src/`
//! impl Describable for Widget {
//!     fn describe() -> String { "widget".into() }
//! }
//!
//! // 3. Collect every implementation at compile time
//! static ALL: EvidenceCollection<Evidence<dyn DescribableDict>> = discover!(Describable);
//! ```

use proc_macro::TokenStream;
use syn::parse_macro_input;

// =============================================================================
// Module Declarations (inner / common / user / discovery)
// =============================================================================

mod common;
mod discovery;
mod inner;
mod user;

use discovery::Mode;

// =============================================================================
// Internal Macros (inner/)
// =============================================================================

/// Generate `Typeable` impls for one std type table.
///
/// # Usage
/// ```ignore
/// impl_std_typeable!(core);   // primitives, core types, tuples
/// impl_std_typeable!(alloc);  // String, Box, Vec, ...
/// impl_std_typeable!(std);    // HashMap, PathBuf, ...
/// ```
#[doc(hidden)]
#[proc_macro]
pub fn impl_std_typeable(input: TokenStream) -> TokenStream {
    let name = parse_macro_input!(input as syn::Ident);
    let Some(types) = inner::std_types::table(&name.to_string()) else {
        return syn::Error::new_spanned(&name, "expected `core`, `alloc` or `std`")
            .to_compile_error()
            .into();
    };
    inner::std_types::expand_impl_std_typeable(&name.to_string(), types)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// =============================================================================
// User-facing Macros (user/)
// =============================================================================

/// Declare a capability.
///
/// Generates `<Trait>Dict`, the object-safe dictionary discovered evidence
/// is erased to. Associated functions without a receiver and constants
/// whose signatures do not mention `Self` are mirrored as `&self` methods;
/// constants become lowercase getters.
///
/// # Usage
/// ```ignore
/// #[capability]
/// pub trait Addable {
///     const ZERO: i64;
///     fn add(a: i64, b: i64) -> i64;
/// }
///
/// // AddableDict::zero(&self) -> i64
/// // AddableDict::add(&self, a: i64, b: i64) -> i64
/// ```
///
/// Traits with generic parameters are rejected.
#[proc_macro_attribute]
pub fn capability(attr: TokenStream, item: TokenStream) -> TokenStream {
    let trait_item = parse_macro_input!(item as syn::ItemTrait);
    user::expand_capability(attr.into(), trait_item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive the run-time type identity capability.
///
/// # Usage
/// ```ignore
/// #[derive(Typeable)]
/// struct Widget;
///
/// #[derive(Typeable)]
/// struct Holder<T>(T); // Typeable when T is
/// ```
#[proc_macro_derive(Typeable)]
pub fn derive_typeable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as syn::DeriveInput);
    user::expand_derive_typeable(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// =============================================================================
// Discovery Macros (discovery/)
// =============================================================================

/// Discover every implementation of a capability.
///
/// Expands to `EvidenceCollection<Evidence<dyn <Cap>Dict>>`, a constant
/// expression.
///
/// # Arguments
///
/// - `Cap`: the capability trait (a path; `<Cap>Dict` must resolve next to it)
/// - `roots = ["src", ..]`: files or directories to scan, relative to the
///   package root. Default `["src"]`.
/// - `krate = path`: module the roots correspond to; local types are
///   resolved under it. Default `crate`.
/// - `warn_skipped`: warn about implementations that were skipped for
///   having preconditions or generic parameters.
///
/// # Usage
/// ```ignore
/// static ADDABLE: EvidenceCollection<Evidence<dyn AddableDict>> = discover!(Addable);
/// let zeros = map_over_instances(&ADDABLE, |tag| tag.zero());
/// ```
#[proc_macro]
pub fn discover(input: TokenStream) -> TokenStream {
    expand_discovery(input, Mode::Packages)
}

/// Like [`discover!`], keeping each type's canonical name and, when the type
/// is `Typeable`, its identity.
///
/// Expands to `EvidenceCollection<EvidenceWithMetadata<dyn <Cap>Dict>>`.
#[proc_macro]
pub fn discover_with_metadata(input: TokenStream) -> TokenStream {
    expand_discovery(input, Mode::WithMetadata)
}

/// The implementations discovery saw but did not package, as
/// `&'static [Skipped]`. Takes the same arguments as [`discover!`].
///
/// # Usage
/// ```ignore
/// for skip in skipped_instances!(Addable) {
///     println!("{} at {}: {:?}", skip.name, skip.location, skip.reason);
/// }
/// ```
#[proc_macro]
pub fn skipped_instances(input: TokenStream) -> TokenStream {
    expand_discovery(input, Mode::Skipped)
}

fn expand_discovery(input: TokenStream, mode: Mode) -> TokenStream {
    let args = parse_macro_input!(input as discovery::input::DiscoverArgs);
    discovery::expand(args, mode)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
