//! `#[capability]` on a trait.
//!
//! Keeps the trait and adds an object-safe dictionary trait next to it:
//!
//! ```text
//! #[capability]                         pub trait DescribableDict: Witness {
//! pub trait Describable {        ==>        fn describe(&self) -> String;
//!     fn describe() -> String;              fn max_len(&self) -> usize;
//!     const MAX_LEN: usize;             }
//! }                                     impl<__T: Describable + 'static> DescribableDict for Proxy<__T> { .. }
//!                                       impl Capability for dyn DescribableDict { .. }
//! ```
//!
//! Only items that can be called without a value of the erased type are
//! mirrored: associated functions without a receiver and constants, whose
//! signatures do not mention `Self`. Everything else stays reachable only
//! through the trait itself.

use std::collections::HashSet;

use proc_macro2::{TokenStream, TokenTree};
use quote::{ToTokens, format_ident, quote};
use syn::{FnArg, Ident, ItemTrait, Signature, TraitItem, TraitItemConst, TraitItemFn, WherePredicate};

pub fn expand_capability(attr: TokenStream, trait_item: ItemTrait) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new_spanned(attr, "`#[capability]` takes no arguments"));
    }
    if !trait_item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &trait_item.generics,
            "capabilities take exactly one type parameter (`Self`); remove the trait's generic parameters",
        ));
    }

    let trait_name = &trait_item.ident;
    let vis = &trait_item.vis;
    let dict = format_ident!("{}Dict", trait_name);
    let name_str = trait_name.to_string();
    let dict_doc = format!("Dictionary object for the [`{}`] capability.", trait_name);

    let mut decls = Vec::new();
    let mut bodies = Vec::new();
    let mut needs_sized = false;
    let mut taken: HashSet<String> = HashSet::new();

    for item in &trait_item.items {
        if let TraitItem::Fn(func) = item {
            if let Some(requires_sized) = forwardable_fn(&func.sig) {
                let (decl, body) = forward_fn(trait_name, func);
                needs_sized |= requires_sized;
                taken.insert(func.sig.ident.to_string());
                decls.push(decl);
                bodies.push(body);
            }
        }
    }
    // Constants become lowercase getters unless a function already has
    // that name.
    for item in &trait_item.items {
        if let TraitItem::Const(constant) = item {
            let getter = format_ident!("{}", constant.ident.to_string().to_lowercase());
            if forwardable_const(constant) && taken.insert(getter.to_string()) {
                let (decl, body) = forward_const(trait_name, constant, &getter);
                decls.push(decl);
                bodies.push(body);
            }
        }
    }

    let bound = if needs_sized {
        quote! { __T: #trait_name + 'static }
    } else {
        quote! { __T: ?::core::marker::Sized + #trait_name + 'static }
    };

    Ok(quote! {
        #trait_item

        #[doc = #dict_doc]
        #vis trait #dict: ::tola_evidence::Witness {
            #(#decls)*
        }

        impl<#bound> #dict for ::tola_evidence::Proxy<__T> {
            #(#bodies)*
        }

        impl ::tola_evidence::Capability for dyn #dict {
            const NAME: &'static str = #name_str;
        }
    })
}

// =============================================================================
// Functions
// =============================================================================

/// `Some(requires_sized)` when the function can be mirrored.
fn forwardable_fn(sig: &Signature) -> Option<bool> {
    if sig.receiver().is_some()
        || sig.asyncness.is_some()
        || sig.variadic.is_some()
        || !sig.generics.params.is_empty()
    {
        return None;
    }

    let inputs: TokenStream = sig.inputs.iter().map(ToTokens::to_token_stream).collect();
    let output = sig.output.to_token_stream();
    if mentions(&inputs, "Self") || mentions(&output, "Self") {
        return None;
    }
    if mentions(&inputs, "impl") || mentions(&output, "impl") {
        return None;
    }
    if has_elided_lifetime(&output) {
        return None;
    }

    // `where Self: Sized` is the only predicate that survives forwarding.
    let mut requires_sized = false;
    if let Some(where_clause) = &sig.generics.where_clause {
        for predicate in &where_clause.predicates {
            match predicate {
                WherePredicate::Type(pred)
                    if pred.bounded_ty.to_token_stream().to_string() == "Self"
                        && pred.bounds.to_token_stream().to_string() == "Sized" =>
                {
                    requires_sized = true;
                }
                _ => return None,
            }
        }
    }
    Some(requires_sized)
}

fn forward_fn(trait_name: &Ident, func: &TraitItemFn) -> (TokenStream, TokenStream) {
    let sig = &func.sig;
    let ident = &sig.ident;
    let unsafety = &sig.unsafety;
    let output = &sig.output;

    let typed: Vec<_> = sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(typed) => Some(&typed.ty),
            FnArg::Receiver(_) => None,
        })
        .collect();
    let args: Vec<_> = (0..typed.len()).map(|i| format_ident!("__arg{}", i)).collect();
    let docs = func.attrs.iter().filter(|attr| attr.path().is_ident("doc"));

    let decl = quote! {
        #(#docs)*
        #unsafety fn #ident(&self #(, #args: #typed)*) #output;
    };

    let call = quote! { <__T as #trait_name>::#ident(#(#args),*) };
    let call = match unsafety {
        Some(_) => quote! { unsafe { #call } },
        None => call,
    };
    let body = quote! {
        #[inline]
        #unsafety fn #ident(&self #(, #args: #typed)*) #output {
            #call
        }
    };
    (decl, body)
}

// =============================================================================
// Constants
// =============================================================================

fn forwardable_const(constant: &TraitItemConst) -> bool {
    constant.generics.params.is_empty() && !mentions(&constant.ty.to_token_stream(), "Self")
}

fn forward_const(trait_name: &Ident, constant: &TraitItemConst, getter: &Ident) -> (TokenStream, TokenStream) {
    let ident = &constant.ident;
    let ty = &constant.ty;
    let doc = format!("Value of `{}::{}`.", trait_name, ident);

    let decl = quote! {
        #[doc = #doc]
        fn #getter(&self) -> #ty;
    };
    let body = quote! {
        #[inline]
        fn #getter(&self) -> #ty {
            <__T as #trait_name>::#ident
        }
    };
    (decl, body)
}

// =============================================================================
// Token Scans
// =============================================================================

/// Whether `ident` occurs anywhere in `tokens`, groups included.
fn mentions(tokens: &TokenStream, ident: &str) -> bool {
    tokens.clone().into_iter().any(|tt| match tt {
        TokenTree::Ident(i) => i == ident,
        TokenTree::Group(g) => mentions(&g.stream(), ident),
        _ => false,
    })
}

/// `&T` without a lifetime, or `'_`. Forwarding through `&self` would
/// rebind such a lifetime to the dictionary.
fn has_elided_lifetime(tokens: &TokenStream) -> bool {
    let tokens: Vec<TokenTree> = tokens.clone().into_iter().collect();
    tokens.iter().enumerate().any(|(i, tt)| match tt {
        TokenTree::Punct(p) if p.as_char() == '&' => {
            !matches!(tokens.get(i + 1), Some(TokenTree::Punct(next)) if next.as_char() == '\'')
        }
        TokenTree::Punct(p) if p.as_char() == '\'' => {
            matches!(tokens.get(i + 1), Some(TokenTree::Ident(next)) if next == "_")
        }
        TokenTree::Group(g) => has_elided_lifetime(&g.stream()),
        _ => false,
    })
}
