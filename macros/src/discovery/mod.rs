//! Compile-time discovery pipeline.
//!
//! ```text
//! DiscoverArgs -> SourceEnvironment -> discover() -> build()
//!   (input)        (oracle)             (package)    (builder)
//! ```

pub mod builder;
pub mod input;
pub mod oracle;
pub mod package;
pub mod source;

use std::path::PathBuf;

use proc_macro2::TokenStream;

pub use builder::Mode;
use builder::BuildContext;
use input::DiscoverArgs;
use oracle::DiscoveryError;
use source::SourceEnvironment;

/// Run discovery for one macro call site.
pub fn expand(args: DiscoverArgs, mode: Mode) -> syn::Result<TokenStream> {
    let to_syn = |err: DiscoveryError| syn::Error::new_spanned(&args.capability, err.to_string());

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .map_err(|err| to_syn(DiscoveryError::NoManifestDir(err.to_string())))?;
    let krate = args.krate.clone().unwrap_or_else(|| syn::parse_quote!(crate));
    let env = SourceEnvironment::load(&manifest_dir, &args.root_strings(), krate);

    let discovery = package::discover(&env, &args.capability_name()).map_err(to_syn)?;

    let dict = args.dict_path();
    let cx = BuildContext {
        dict: &dict,
        tracked: env.tracked_files(),
        warn_skipped: args.warn_skipped,
    };
    Ok(builder::build(&discovery, &cx, mode))
}
