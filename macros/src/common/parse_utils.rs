//! Common parsing utilities
//!
//! Shared parsing helpers for consistent syntax across macros.

use syn::{
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    Ident, Token,
};

// =============================================================================
// Comma-separated List Parsing
// =============================================================================

/// Parse a bracketed, comma-separated list: `[a, b, c]`
pub fn parse_bracketed<T: Parse>(input: ParseStream) -> syn::Result<Vec<T>> {
    let content;
    syn::bracketed!(content in input);
    let items = Punctuated::<T, Token![,]>::parse_terminated(&content)?;
    Ok(items.into_iter().collect())
}

// =============================================================================
// Keyword Detection
// =============================================================================

/// Check if the next identifier is a specific keyword
pub fn peek_keyword(input: ParseStream, keyword: &str) -> bool {
    if input.peek(Ident) {
        let fork = input.fork();
        if let Ok(ident) = fork.parse::<Ident>() {
            return ident == keyword;
        }
    }
    false
}

/// Consume an identifier if it matches the keyword
pub fn try_parse_keyword(input: ParseStream, keyword: &str) -> syn::Result<bool> {
    if peek_keyword(input, keyword) {
        let _: Ident = input.parse()?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Check whether an attribute's path ends in `name` (`#[name]`,
/// `#[tola_evidence::name]`).
pub fn attr_is(attr: &syn::Attribute, name: &str) -> bool {
    attr.path().segments.last().is_some_and(|seg| seg.ident == name)
}

/// Check whether `#[derive(...)]` attributes list `name`.
pub fn derives(attrs: &[syn::Attribute], name: &str) -> bool {
    attrs.iter().filter(|attr| attr_is(attr, "derive")).any(|attr| {
        attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
            .map(|paths| paths.iter().any(|p| p.segments.last().is_some_and(|seg| seg.ident == name)))
            .unwrap_or(false)
    })
}

/// Check for `#[cfg(...)]`; such items are outside what discovery can see.
pub fn is_cfg_gated(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident("cfg"))
}
