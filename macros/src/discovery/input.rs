//! Discovery macro arguments.
//!
//! ```text
//! discover!(Describable)
//! discover!(shapes::Describable, roots = ["src/shapes"], krate = ::my_crate, warn_skipped)
//! ```

use syn::{
    Ident, LitStr, Path, Token,
    parse::{Parse, ParseStream},
};

use crate::common;

pub struct DiscoverArgs {
    /// Capability trait as named at the call site.
    pub capability: Path,
    /// Scan roots relative to the manifest directory; default `["src"]`.
    pub roots: Vec<LitStr>,
    /// Path locally declared types are qualified with; default `crate`.
    pub krate: Option<Path>,
    pub warn_skipped: bool,
}

impl DiscoverArgs {
    /// Name the environment is queried with.
    pub fn capability_name(&self) -> String {
        self.capability
            .segments
            .last()
            .map(|seg| seg.ident.to_string())
            .unwrap_or_default()
    }

    /// `Describable` -> `DescribableDict`, keeping any leading path.
    pub fn dict_path(&self) -> Path {
        let mut path = self.capability.clone();
        if let Some(last) = path.segments.last_mut() {
            last.ident = Ident::new(&format!("{}Dict", last.ident), last.ident.span());
        }
        path
    }

    pub fn root_strings(&self) -> Vec<String> {
        if self.roots.is_empty() {
            vec!["src".to_string()]
        } else {
            self.roots.iter().map(LitStr::value).collect()
        }
    }
}

impl Parse for DiscoverArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let capability: Path = input.parse()?;
        if let Some(last) = capability.segments.last() {
            if !last.arguments.is_none() {
                return Err(syn::Error::new_spanned(
                    &last.arguments,
                    "capabilities take exactly one type parameter; name the trait without arguments",
                ));
            }
        }

        let mut args = DiscoverArgs {
            capability,
            roots: Vec::new(),
            krate: None,
            warn_skipped: false,
        };

        while input.parse::<Option<Token![,]>>()?.is_some() {
            if input.is_empty() {
                break;
            }
            if common::try_parse_keyword(input, "warn_skipped")? {
                args.warn_skipped = true;
            } else if common::peek_keyword(input, "roots") {
                let _: Ident = input.parse()?;
                input.parse::<Token![=]>()?;
                args.roots = common::parse_bracketed::<LitStr>(input)?;
                if args.roots.is_empty() {
                    return Err(input.error("`roots` must name at least one file or directory"));
                }
            } else if common::try_parse_keyword(input, "krate")? {
                input.parse::<Token![=]>()?;
                args.krate = Some(input.parse()?);
            } else {
                return Err(input.error("expected `roots = [..]`, `krate = path` or `warn_skipped`"));
            }
        }

        if !input.is_empty() {
            return Err(input.error("unexpected tokens after discovery arguments"));
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;

    fn parse(src: &str) -> syn::Result<DiscoverArgs> {
        syn::parse_str(src)
    }

    #[test]
    fn test_defaults() {
        let args = parse("Describable").unwrap();
        assert_eq!(args.capability_name(), "Describable");
        assert_eq!(args.root_strings(), ["src"]);
        assert!(args.krate.is_none());
        assert!(!args.warn_skipped);
    }

    #[test]
    fn test_dict_path_keeps_prefix() {
        let args = parse("crate::shapes::Describable").unwrap();
        assert_eq!(args.capability_name(), "Describable");
        assert_eq!(
            args.dict_path().to_token_stream().to_string(),
            "crate :: shapes :: DescribableDict"
        );
    }

    #[test]
    fn test_all_options() {
        let args = parse(r#"Addable, roots = ["tests/a.rs", "tests/b"], krate = ::my_crate, warn_skipped,"#).unwrap();
        assert_eq!(args.root_strings(), ["tests/a.rs", "tests/b"]);
        assert_eq!(args.krate.unwrap().to_token_stream().to_string(), ":: my_crate");
        assert!(args.warn_skipped);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse("Convert<u8>").is_err());
        assert!(parse("Addable, roots = []").is_err());
        assert!(parse("Addable, verbose").is_err());
        assert!(parse("Addable, crate = foo").is_err());
    }
}
