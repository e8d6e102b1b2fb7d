//! Type normalizer.
//!
//! Renders a type expression into its canonical name: the layout of
//! `core::any::type_name` with lifetimes dropped. Paths lose their crate
//! segment (`crate::shapes::Widget` -> `shapes::Widget`); paths into
//! `core`, `alloc` and `std` shorten to their last segment. The run-time
//! side (`tola_evidence::name`) applies the same rules to `type_name`
//! output, so both ends agree.
//!
//! Names are only comparable once discovery has qualified the type: a
//! local `Widget` written in module `shapes` is named from
//! `crate::shapes::Widget`.
//!
//! Parentheses and invisible groups (what `macro_rules!` wraps a `$t:ty`
//! in) are stripped first, so `(Widget)` and `Widget` normalize alike.
//! Everything after that is syntactic: `Meters` and `f64` stay different
//! even if one aliases the other.

use quote::ToTokens;
use syn::{GenericArgument, PathArguments, ReturnType, Type, TypeParamBound};

/// Strip any wrapping parentheses or invisible groups.
pub fn strip_annotation(ty: &Type) -> &Type {
    match ty {
        Type::Paren(paren) => strip_annotation(&paren.elem),
        Type::Group(group) => strip_annotation(&group.elem),
        other => other,
    }
}

/// Canonical name of a type expression.
pub fn canonical_name(ty: &Type) -> String {
    let mut out = String::new();
    render(strip_annotation(ty), &mut out);
    out
}

fn render(ty: &Type, out: &mut String) {
    match ty {
        Type::Paren(paren) => render(&paren.elem, out),
        Type::Group(group) => render(&group.elem, out),
        Type::Path(path) => render_path(&path.path, out),
        Type::Reference(reference) => {
            out.push('&');
            if reference.mutability.is_some() {
                out.push_str("mut ");
            }
            render(&reference.elem, out);
        }
        Type::Ptr(ptr) => {
            out.push_str(if ptr.mutability.is_some() { "*mut " } else { "*const " });
            render(&ptr.elem, out);
        }
        Type::Slice(slice) => {
            out.push('[');
            render(&slice.elem, out);
            out.push(']');
        }
        Type::Array(array) => {
            out.push('[');
            render(&array.elem, out);
            out.push_str("; ");
            out.push_str(&compact(&array.len));
            out.push(']');
        }
        Type::Tuple(tuple) => {
            out.push('(');
            render_list(tuple.elems.iter(), out);
            if tuple.elems.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Type::BareFn(bare) => {
            if bare.unsafety.is_some() {
                out.push_str("unsafe ");
            }
            if let Some(abi) = &bare.abi {
                out.push_str("extern ");
                if let Some(name) = &abi.name {
                    out.push_str(&name.to_token_stream().to_string());
                    out.push(' ');
                }
            }
            out.push_str("fn(");
            render_list(bare.inputs.iter().map(|arg| &arg.ty), out);
            out.push(')');
            render_return(&bare.output, out);
        }
        Type::TraitObject(object) => {
            out.push_str("dyn ");
            render_bounds(object.bounds.iter(), out);
        }
        Type::ImplTrait(imp) => {
            out.push_str("impl ");
            render_bounds(imp.bounds.iter(), out);
        }
        Type::Never(_) => out.push('!'),
        Type::Infer(_) => out.push('_'),
        other => out.push_str(&compact(other)),
    }
}

fn render_list<'a>(types: impl Iterator<Item = &'a Type>, out: &mut String) {
    for (i, ty) in types.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render(ty, out);
    }
}

fn render_return(output: &ReturnType, out: &mut String) {
    if let ReturnType::Type(_, ty) = output {
        out.push_str(" -> ");
        render(ty, out);
    }
}

fn render_bounds<'a>(bounds: impl Iterator<Item = &'a TypeParamBound>, out: &mut String) {
    let mut first = true;
    for bound in bounds {
        if let TypeParamBound::Trait(trait_bound) = bound {
            if !first {
                out.push_str(" + ");
            }
            first = false;
            render_path(&trait_bound.path, out);
        }
    }
}

/// Crates whose paths shorten to the last segment.
const STD_CRATES: &[&str] = &["core", "alloc", "std"];

/// Path without its crate segment, plus the last segment's arguments.
///
/// ```text
/// Widget                   -> Widget
/// std::string::String      -> String
/// crate::shapes::Widget    -> shapes::Widget
/// ::other::parts::Gear<u8> -> parts::Gear<u8>
/// ```
fn render_path(path: &syn::Path, out: &mut String) {
    let Some(last) = path.segments.last() else {
        return;
    };
    let idents: Vec<String> = path.segments.iter().map(|seg| seg.ident.to_string()).collect();
    let shown = match idents.as_slice() {
        [single] => single.clone(),
        [first, ..] if STD_CRATES.contains(&first.as_str()) => last.ident.to_string(),
        [_, rest @ ..] => rest.join("::"),
        [] => return,
    };
    out.push_str(&shown);

    match &last.arguments {
        PathArguments::None => {}
        PathArguments::AngleBracketed(args) => {
            let rendered: Vec<String> = args
                .args
                .iter()
                .filter_map(|arg| match arg {
                    GenericArgument::Lifetime(_) => None,
                    GenericArgument::Type(ty) => Some(canonical_name(ty)),
                    GenericArgument::Const(expr) => Some(compact(expr)),
                    GenericArgument::AssocType(assoc) => {
                        Some(format!("{} = {}", assoc.ident, canonical_name(&assoc.ty)))
                    }
                    other => Some(compact(other)),
                })
                .collect();
            if !rendered.is_empty() {
                out.push('<');
                out.push_str(&rendered.join(", "));
                out.push('>');
            }
        }
        PathArguments::Parenthesized(args) => {
            out.push('(');
            render_list(args.inputs.iter(), out);
            out.push(')');
            render_return(&args.output, out);
        }
    }
}

/// Token text with all whitespace removed; used for const expressions and
/// anything without a structured rendering.
fn compact(tokens: &impl ToTokens) -> String {
    tokens
        .to_token_stream()
        .to_string()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
