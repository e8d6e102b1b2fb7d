//! Evidence collection builder.
//!
//! Renders a [`Discovery`] into the literal the discovery macros expand to.
//! Every expansion is a block expression that is const-evaluable, so it can
//! initialize a `static`:
//!
//! ```text
//! {
//!     const _: &[u8] = include_bytes!("/abs/src/lib.rs");    // rebuild tracking
//!     #[deprecated(note = "...")] const __tola_evidence_diagnostic_0: () = ();
//!     const _: () = __tola_evidence_diagnostic_0;           // warning carrier
//!     const __TOLA_EVIDENCE: &[Evidence<dyn CapDict>] = &[ .. ];
//!     EvidenceCollection::new(__TOLA_EVIDENCE, 0x..)
//! }
//! ```

use std::path::PathBuf;

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};

use super::package::{Discovery, IdentityPlan, Package, SkipKind};

/// What a discovery macro expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `EvidenceCollection<Evidence<dyn CapDict>>`
    Packages,
    /// `EvidenceCollection<EvidenceWithMetadata<dyn CapDict>>`
    WithMetadata,
    /// `&'static [Skipped]`
    Skipped,
}

/// Inputs the builder needs besides the discovery result.
pub struct BuildContext<'a> {
    /// Path to the capability's dictionary trait.
    pub dict: &'a syn::Path,
    /// Files whose contents the result depends on.
    pub tracked: &'a [PathBuf],
    /// Warn about constrained and generic skips too.
    pub warn_skipped: bool,
}

pub fn build(discovery: &Discovery, cx: &BuildContext<'_>, mode: Mode) -> TokenStream {
    let tracking = tracking(cx.tracked);
    let diagnostics = diagnostics(discovery, cx.warn_skipped);
    let body = match mode {
        Mode::Packages => packages(discovery, cx.dict),
        Mode::WithMetadata => with_metadata(discovery, cx.dict),
        Mode::Skipped => skipped(discovery),
    };

    quote! {
        {
            #tracking
            #diagnostics
            #body
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

fn evidence_expr(package: &Package, dict: &syn::Path) -> TokenStream {
    let ty = &package.ty;
    quote! {
        ::tola_evidence::Evidence::<dyn #dict>::new(&::tola_evidence::Proxy::<#ty>::NEW)
    }
}

fn packages(discovery: &Discovery, dict: &syn::Path) -> TokenStream {
    let entries = discovery.packages.iter().map(|p| evidence_expr(p, dict));
    let fingerprint = discovery.fingerprint();
    quote! {
        const __TOLA_EVIDENCE: &[::tola_evidence::Evidence<dyn #dict>] = &[#(#entries),*];
        ::tola_evidence::EvidenceCollection::new(__TOLA_EVIDENCE, #fingerprint)
    }
}

fn with_metadata(discovery: &Discovery, dict: &syn::Path) -> TokenStream {
    let entries = discovery.packages.iter().map(|package| {
        let evidence = evidence_expr(package, dict);
        let name = &package.name;
        let identity = identity_expr(package);
        quote! {
            ::tola_evidence::EvidenceWithMetadata::<dyn #dict>::new(#evidence, #name, #identity)
        }
    });
    let fingerprint = discovery.fingerprint();
    quote! {
        #[allow(unused_imports)]
        use ::tola_evidence::identity::probe::IdentityFallback as _;
        const __TOLA_EVIDENCE: &[::tola_evidence::EvidenceWithMetadata<dyn #dict>] = &[#(#entries),*];
        ::tola_evidence::EvidenceCollection::new(__TOLA_EVIDENCE, #fingerprint)
    }
}

fn identity_expr(package: &Package) -> TokenStream {
    let ty = &package.ty;
    match &package.identity {
        IdentityPlan::Present(resolver) => quote! { ::core::option::Option::Some(#resolver) },
        IdentityPlan::Probe => quote! { ::tola_evidence::identity::probe::Probe::<#ty>::IDENTITY },
    }
}

// =============================================================================
// Skip Records
// =============================================================================

fn skipped(discovery: &Discovery) -> TokenStream {
    let entries = discovery.skipped.iter().map(|skip| {
        let name = &skip.name;
        let reason = format_ident!("{}", skip.reason.as_str());
        let location = skip.origin.location();
        let detail = &skip.detail;
        quote! {
            ::tola_evidence::Skipped {
                name: #name,
                reason: ::tola_evidence::SkipReason::#reason,
                location: #location,
                detail: #detail,
            }
        }
    });
    quote! {
        const __TOLA_SKIPPED: &[::tola_evidence::Skipped] = &[#(#entries),*];
        __TOLA_SKIPPED
    }
}

// =============================================================================
// Tracking & Diagnostics
// =============================================================================

fn tracking(files: &[PathBuf]) -> TokenStream {
    let paths = files.iter().map(|path| path.to_string_lossy().into_owned());
    quote! {
        #(const _: &[u8] = include_bytes!(#paths);)*
    }
}

/// Warnings for the call site, carried by use of a deprecated constant.
fn diagnostics(discovery: &Discovery, warn_skipped: bool) -> TokenStream {
    let messages = discovery
        .skipped
        .iter()
        .filter(|skip| warn_skipped || skip.reason == SkipKind::Malformed)
        .map(|skip| skip.message(&discovery.capability));

    let carriers = messages.enumerate().map(|(i, message)| {
        let ident = syn::Ident::new(&format!("__tola_evidence_diagnostic_{}", i), Span::call_site());
        quote! {
            #[deprecated(note = #message)]
            #[allow(non_upper_case_globals, dead_code)]
            const #ident: () = ();
            const _: () = #ident;
        }
    });
    quote! { #(#carriers)* }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::package::discover;
    use crate::discovery::package::tests::{MockOracle, addable};
    use crate::discovery::oracle::Answer;

    fn render(discovery: &Discovery, mode: Mode, warn_skipped: bool) -> String {
        let dict: syn::Path = syn::parse_quote!(AddableDict);
        let tracked = vec![PathBuf::from("/work/src/lib.rs")];
        let cx = BuildContext {
            dict: &dict,
            tracked: &tracked,
            warn_skipped,
        };
        build(discovery, &cx, mode).to_string()
    }

    #[test]
    fn test_packages_keep_order() {
        let discovery = discover(&addable(), "Addable").unwrap();
        let out = render(&discovery, Mode::Packages, false);
        let i64_at = out.find("Proxy :: < i64 >").unwrap();
        let string_at = out.find("Proxy :: < String >").unwrap();
        assert!(i64_at < string_at);
        assert!(!out.contains("Vec"));
        assert!(out.contains("include_bytes ! (\"/work/src/lib.rs\")"));
        assert!(out.contains(&format!("{}u64", discovery.fingerprint())));
    }

    #[test]
    fn test_metadata_identities() {
        let oracle = MockOracle::new()
            .implementation("Describable", &[], &[], "Widget")
            .implementation("Describable", &[], &[], "Gadget")
            .implementation("Describable", &[], &[], "Gizmo")
            .typeable("Widget", Answer::Yes)
            .typeable("Gizmo", Answer::Deferred);
        let discovery = discover(&oracle, "Describable").unwrap();
        let out = render(&discovery, Mode::WithMetadata, false);

        assert!(out.contains("Some (:: tola_evidence :: TypeIdentity :: of :: < Widget >"));
        assert!(out.contains("Probe :: < Gadget > :: IDENTITY"));
        assert!(out.contains("Probe :: < Gizmo > :: IDENTITY"));
    }

    #[test]
    fn test_skip_records() {
        let discovery = discover(&addable(), "Addable").unwrap();
        let out = render(&discovery, Mode::Skipped, false);
        assert!(out.contains("SkipReason :: Constrained"));
        assert!(out.contains("name : \"Vec<T>\""));
        assert!(out.contains("detail : \"T: Addable\""));
    }

    #[test]
    fn test_warnings() {
        let discovery = discover(&addable().malformed("Addable", "bad"), "Addable").unwrap();

        let quiet = render(&discovery, Mode::Packages, false);
        assert_eq!(quiet.matches("deprecated").count(), 1);
        assert!(quiet.contains("ignoring `Addable` implementation `bad`"));

        let loud = render(&discovery, Mode::Packages, true);
        assert_eq!(loud.matches("deprecated").count(), 2);
        assert!(loud.contains("has preconditions (T: Addable)"));
    }

    #[test]
    fn test_empty_collection() {
        let discovery = discover(&MockOracle::new().implementation("Cap", &["T"], &[], "Box<T>"), "Cap").unwrap();
        let out = render(&discovery, Mode::Packages, false);
        assert!(out.contains("= & [] ;"));
    }
}
