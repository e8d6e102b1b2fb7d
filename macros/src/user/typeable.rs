//! `#[derive(Typeable)]`

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, GenericParam};

/// Implement `Typeable`, requiring it of every type parameter.
pub fn expand_derive_typeable(mut input: DeriveInput) -> syn::Result<TokenStream> {
    if let Some(lifetime) = input.generics.lifetimes().next() {
        return Err(syn::Error::new_spanned(
            lifetime,
            "`Typeable` types must be `'static`; remove the lifetime parameter",
        ));
    }

    for param in input.generics.params.iter_mut() {
        if let GenericParam::Type(type_param) = param {
            type_param.bounds.push(syn::parse_quote!(::tola_evidence::Typeable));
        }
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::tola_evidence::Typeable for #name #ty_generics #where_clause {}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(src: &str) -> syn::Result<String> {
        expand_derive_typeable(syn::parse_str(src)?).map(|ts| ts.to_string())
    }

    #[test]
    fn test_plain_struct() {
        let out = expand("struct Widget;").unwrap();
        assert_eq!(out, "impl :: tola_evidence :: Typeable for Widget { }");
    }

    #[test]
    fn test_generic_parameters_are_bounded() {
        let out = expand("enum Either<L, R: Clone> { L(L), R(R) }").unwrap();
        assert!(out.contains("L : :: tola_evidence :: Typeable"), "{}", out);
        assert!(out.contains("R : Clone + :: tola_evidence :: Typeable"), "{}", out);
    }

    #[test]
    fn test_lifetimes_are_rejected() {
        assert!(expand("struct Borrowed<'a>(&'a str);").is_err());
    }
}
