//! Standard library type tables for `Typeable` impl generation.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{GenericParam, Generics, Type};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Concrete,
    /// Generic parameter list; every type parameter gets a `Typeable` bound.
    Generic(&'static str),
}

use TypeKind::*;

/// Primitive and core types (always available).
pub const CORE_TYPES: &[(&str, TypeKind)] = &[
    ("()", Concrete),
    ("bool", Concrete),
    ("char", Concrete),
    ("str", Concrete),

    // Unsigned integers
    ("u8", Concrete),
    ("u16", Concrete),
    ("u32", Concrete),
    ("u64", Concrete),
    ("u128", Concrete),
    ("usize", Concrete),

    // Signed integers
    ("i8", Concrete),
    ("i16", Concrete),
    ("i32", Concrete),
    ("i64", Concrete),
    ("i128", Concrete),
    ("isize", Concrete),

    // Floats
    ("f32", Concrete),
    ("f64", Concrete),

    // Slices, arrays, references
    ("[T]", Generic("T")),
    ("[T; N]", Generic("T, const N: usize")),
    ("&'static T", Generic("T: ?Sized")),
    ("&'static mut T", Generic("T: ?Sized")),

    // Option/Result
    ("::core::option::Option<T>", Generic("T")),
    ("::core::result::Result<T, E>", Generic("T, E")),

    // Misc core
    ("::core::marker::PhantomData<T>", Generic("T: ?Sized")),
    ("::core::cell::Cell<T>", Generic("T: ?Sized")),
    ("::core::cell::RefCell<T>", Generic("T: ?Sized")),
    ("::core::num::Wrapping<T>", Generic("T")),
    ("::core::ops::Range<T>", Generic("T")),
    ("::core::ops::RangeInclusive<T>", Generic("T")),
    ("::core::time::Duration", Concrete),
    ("::core::convert::Infallible", Concrete),
    ("::core::cmp::Ordering", Concrete),
];

/// Alloc library types.
pub const ALLOC_TYPES: &[(&str, TypeKind)] = &[
    ("::alloc::string::String", Concrete),
    ("::alloc::borrow::Cow<'static, str>", Concrete),

    // Smart pointers
    ("::alloc::boxed::Box<T>", Generic("T: ?Sized")),
    ("::alloc::rc::Rc<T>", Generic("T: ?Sized")),
    ("::alloc::sync::Arc<T>", Generic("T: ?Sized")),

    // Collections
    ("::alloc::vec::Vec<T>", Generic("T")),
    ("::alloc::collections::VecDeque<T>", Generic("T")),
    ("::alloc::collections::BTreeMap<K, V>", Generic("K, V")),
    ("::alloc::collections::BTreeSet<T>", Generic("T")),
];

/// Standard library types (requires the "std" feature).
pub const STD_TYPES: &[(&str, TypeKind)] = &[
    ("::std::collections::HashMap<K, V>", Generic("K, V")),
    ("::std::collections::HashSet<T>", Generic("T")),
    ("::std::path::Path", Concrete),
    ("::std::path::PathBuf", Concrete),
    ("::std::ffi::OsString", Concrete),
    ("::std::time::SystemTime", Concrete),
    ("::std::time::Instant", Concrete),
    ("::std::net::IpAddr", Concrete),
    ("::std::net::SocketAddr", Concrete),
    ("::std::sync::Mutex<T>", Generic("T: ?Sized")),
    ("::std::io::Error", Concrete),
];

/// Largest tuple arity that gets a `Typeable` impl.
const MAX_TUPLE: usize = 12;

/// Select a table by name: `core`, `alloc` or `std`.
pub fn table(name: &str) -> Option<&'static [(&'static str, TypeKind)]> {
    match name {
        "core" => Some(CORE_TYPES),
        "alloc" => Some(ALLOC_TYPES),
        "std" => Some(STD_TYPES),
        _ => None,
    }
}

/// Generate `Typeable` impls for one table. The `core` table also gets
/// tuple impls.
pub fn expand_impl_std_typeable(name: &str, types: &[(&str, TypeKind)]) -> syn::Result<TokenStream> {
    let mut impls = Vec::new();

    for (path, kind) in types {
        let ty: Type = syn::parse_str(path)?;
        let generics = match kind {
            Concrete => Generics::default(),
            Generic(params) => typeable_generics(params)?,
        };
        let (impl_generics, _, _) = generics.split_for_impl();
        impls.push(quote! {
            impl #impl_generics ::tola_evidence::Typeable for #ty {}
        });
    }

    if name == "core" {
        for arity in 1..=MAX_TUPLE {
            let params: Vec<_> = (0..arity).map(|i| quote::format_ident!("T{}", i)).collect();
            impls.push(quote! {
                impl<#(#params: ::tola_evidence::Typeable),*> ::tola_evidence::Typeable for (#(#params,)*) {}
            });
        }
    }

    Ok(quote! { #(#impls)* })
}

/// Parse a parameter list and bound every type parameter by `Typeable`,
/// keeping only a `?Sized` relaxation from the original bounds.
fn typeable_generics(params: &str) -> syn::Result<Generics> {
    let mut generics: Generics = syn::parse_str(&format!("<{}>", params))?;
    for param in generics.params.iter_mut() {
        if let GenericParam::Type(type_param) = param {
            let relaxed = type_param.bounds.iter().any(|bound| {
                matches!(bound, syn::TypeParamBound::Trait(t) if matches!(t.modifier, syn::TraitBoundModifier::Maybe(_)))
            });
            type_param.bounds.clear();
            if relaxed {
                type_param.bounds.push(syn::parse_quote!(?Sized));
            }
            type_param.bounds.push(syn::parse_quote!(::tola_evidence::Typeable));
        }
    }
    Ok(generics)
}
