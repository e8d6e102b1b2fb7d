//! Source-scanning oracle.
//!
//! Reads every `.rs` file under the configured roots, parses it with `syn`
//! and indexes what discovery asks about: trait declarations, trait impls,
//! locally declared types and `Typeable` evidence.
//!
//! ```text
//! roots = ["src"]
//!   src/lib.rs          -> module []
//!   src/shapes.rs       -> module [shapes]
//!   src/shapes/mod.rs   -> module [shapes]
//!   mod inner { .. }    -> module [.., inner]
//! ```
//!
//! Files are visited in sorted path order and items in source order; that
//! is the environment's reporting order. Implementing types are rewritten
//! to absolute paths (through local declarations, `use` items,
//! `self`/`super` and child modules) so they resolve at the discovery call
//! site. `#[cfg(..)]`-gated items are skipped since their condition cannot
//! be evaluated here. Items inside function bodies are skipped since they
//! cannot be named from elsewhere.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use quote::ToTokens;
use syn::{GenericArgument, GenericParam, Ident, Item, ItemImpl, PathArguments, Type, UseTree, WherePredicate};

use super::oracle::{Answer, DiscoveryError, ImplementationRecord, Oracle, Origin, Reported, TYPEABLE};
use crate::common::{self, normalize};

/// One scanned file.
struct SourceFile {
    /// Path as shown in diagnostics (relative to the manifest dir).
    display: String,
    module: Vec<String>,
    ast: Result<syn::File, String>,
}

struct TraitDecl {
    name: String,
    is_capability: bool,
    origin: Origin,
}

struct ImplDecl {
    item: ItemImpl,
    origin: Origin,
}

/// The compile-time environment as seen through a set of source roots.
pub struct SourceEnvironment {
    roots: Vec<String>,
    files: Vec<SourceFile>,
    /// Absolute paths of every file read, for rebuild tracking.
    tracked: Vec<PathBuf>,
    krate: syn::Path,
    traits: Vec<TraitDecl>,
    impls: Vec<ImplDecl>,
    /// `(module, ident)` of every struct, enum, union and type alias.
    declared: HashSet<(Vec<String>, String)>,
    /// Every module seen, file-backed or inline.
    modules: HashSet<Vec<String>>,
    /// `(module, alias)` -> imported path, from `use` items.
    imports: HashMap<(Vec<String>, String), Vec<String>>,
    /// module -> paths of its `use ..::*` items.
    globs: HashMap<Vec<String>, Vec<Vec<String>>>,
    /// `(module, type)` of every `#[derive(Typeable)]` and direct
    /// `impl Typeable for ..`, as written.
    typeable_decls: Vec<(Vec<String>, Type)>,
    /// Qualified paths of the types in `typeable_decls`.
    typeable: HashSet<String>,
}

impl SourceEnvironment {
    /// Scan `roots` (files or directories, relative to `manifest_dir`).
    pub fn load(manifest_dir: &Path, roots: &[String], krate: syn::Path) -> Self {
        let mut files = Vec::new();
        let mut tracked = Vec::new();

        for root in roots {
            let root_path = manifest_dir.join(root);
            let mut found = Vec::new();
            if let Err(err) = collect_rs_files(&root_path, &mut found) {
                files.push(SourceFile {
                    display: root.clone(),
                    module: Vec::new(),
                    ast: Err(err),
                });
                continue;
            }
            skip_binary_targets(&root_path, &mut found);
            found.sort();

            for path in found {
                let display = display_path(manifest_dir, &path);
                let module = module_of(&root_path, &path);
                let ast = fs::read_to_string(&path)
                    .map_err(|err| err.to_string())
                    .and_then(|text| syn::parse_file(&text).map_err(|err| err.to_string()));
                tracked.push(path);
                files.push(SourceFile { display, module, ast });
            }
        }

        Self::index(roots.to_vec(), files, tracked, krate)
    }

    /// Build an environment from in-memory sources: `(file, module, text)`.
    /// `module` uses `::` separators, empty for the crate root.
    #[cfg(test)]
    pub fn from_sources(sources: &[(&str, &str, &str)]) -> Self {
        let files = sources
            .iter()
            .map(|(file, module, text)| SourceFile {
                display: file.to_string(),
                module: module.split("::").filter(|m| !m.is_empty()).map(String::from).collect(),
                ast: syn::parse_file(text).map_err(|err| err.to_string()),
            })
            .collect();
        let roots = sources.iter().map(|(file, _, _)| file.to_string()).collect();
        Self::index(roots, files, Vec::new(), syn::parse_quote!(crate))
    }

    pub fn tracked_files(&self) -> &[PathBuf] {
        &self.tracked
    }

    fn index(roots: Vec<String>, files: Vec<SourceFile>, tracked: Vec<PathBuf>, krate: syn::Path) -> Self {
        let mut env = SourceEnvironment {
            roots,
            files: Vec::new(),
            tracked,
            krate,
            traits: Vec::new(),
            impls: Vec::new(),
            declared: HashSet::new(),
            modules: HashSet::new(),
            imports: HashMap::new(),
            globs: HashMap::new(),
            typeable_decls: Vec::new(),
            typeable: HashSet::new(),
        };
        for file in &files {
            if let Ok(ast) = &file.ast {
                env.modules.insert(file.module.clone());
                let mut module = file.module.clone();
                env.walk(&file.display, &mut module, &ast.items);
            }
        }
        // Qualifying needs every module and import, so it runs last.
        env.typeable = env
            .typeable_decls
            .iter()
            .map(|(module, ty)| type_key(&env.qualify(ty, module)))
            .collect();
        env.files = files;
        env
    }

    fn walk(&mut self, file: &str, module: &mut Vec<String>, items: &[Item]) {
        for item in items {
            match item {
                Item::Trait(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    self.traits.push(TraitDecl {
                        name: decl.ident.to_string(),
                        is_capability: decl.attrs.iter().any(|a| common::attr_is(a, "capability")),
                        origin: Origin::new(file, module.clone()),
                    });
                }
                Item::Impl(imp) if !common::is_cfg_gated(&imp.attrs) => {
                    if trait_name(imp).as_deref() == Some(TYPEABLE) && imp.generics.params.is_empty() {
                        let ty = normalize::strip_annotation(&imp.self_ty).clone();
                        self.typeable_decls.push((module.clone(), ty));
                    }
                    self.impls.push(ImplDecl {
                        item: imp.clone(),
                        origin: Origin::new(file, module.clone()),
                    });
                }
                Item::Struct(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    self.declare(module, &decl.ident, &decl.attrs, &decl.generics);
                }
                Item::Enum(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    self.declare(module, &decl.ident, &decl.attrs, &decl.generics);
                }
                Item::Union(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    self.declare(module, &decl.ident, &decl.attrs, &decl.generics);
                }
                Item::Type(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    self.declared.insert((module.clone(), decl.ident.to_string()));
                }
                Item::Mod(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    module.push(decl.ident.to_string());
                    self.modules.insert(module.clone());
                    if let Some((_, items)) = &decl.content {
                        self.walk(file, module, items);
                    }
                    module.pop();
                }
                Item::Use(decl) if !common::is_cfg_gated(&decl.attrs) => {
                    let mut imported = Vec::new();
                    let mut globbed = Vec::new();
                    flatten_use(&decl.tree, &mut Vec::new(), &mut imported, &mut globbed);
                    for (alias, target) in imported {
                        self.imports.insert((module.clone(), alias), target);
                    }
                    self.globs.entry(module.clone()).or_default().extend(globbed);
                }
                _ => {}
            }
        }
    }

    fn declare(&mut self, module: &[String], ident: &Ident, attrs: &[syn::Attribute], generics: &syn::Generics) {
        self.declared.insert((module.to_vec(), ident.to_string()));
        // Generic types are Typeable only for Typeable arguments; leave
        // those to the type checker.
        if generics.params.is_empty() && common::derives(attrs, TYPEABLE) {
            self.typeable_decls.push((module.to_vec(), syn::parse_quote!(#ident)));
        }
    }

    fn record(&self, decl: &ImplDecl, capability: &str) -> Reported {
        let imp = &decl.item;
        let self_ty = normalize::strip_annotation(&imp.self_ty).clone();
        let name = normalize::canonical_name(&self_ty);
        let malformed = |reason: String| Reported::Malformed {
            name: name.clone(),
            origin: decl.origin.clone(),
            reason,
        };

        if let Some((Some(_), _, _)) = &imp.trait_ {
            return malformed(format!("negative implementation of `{}`", capability));
        }
        if let Some((_, path, _)) = &imp.trait_ {
            if let Some(last) = path.segments.last() {
                if !matches!(last.arguments, PathArguments::None) {
                    return malformed(format!(
                        "`{}` is applied to extra arguments `{}`; capabilities take exactly one type parameter",
                        capability,
                        last.arguments.to_token_stream()
                    ));
                }
            }
        }
        if !is_plain_type(&self_ty) {
            return malformed(format!(
                "implementing type `{}` is not a plain type expression",
                self_ty.to_token_stream()
            ));
        }

        let mut preconditions = Vec::new();
        let mut generic_params = Vec::new();
        for param in &imp.generics.params {
            match param {
                GenericParam::Type(tp) => {
                    generic_params.push(tp.ident.to_string());
                    if !tp.bounds.is_empty() {
                        preconditions.push(format!("{}: {}", tp.ident, tp.bounds.to_token_stream()));
                    }
                }
                GenericParam::Lifetime(lp) => {
                    generic_params.push(lp.lifetime.to_string());
                    if !lp.bounds.is_empty() {
                        preconditions.push(format!("{}: {}", lp.lifetime, lp.bounds.to_token_stream()));
                    }
                }
                GenericParam::Const(cp) => generic_params.push(cp.ident.to_string()),
            }
        }
        if let Some(where_clause) = &imp.generics.where_clause {
            preconditions.extend(where_clause.predicates.iter().map(render_predicate));
        }

        let path_ty = self.qualify(&self_ty, &decl.origin.module);
        Reported::Implementation(ImplementationRecord {
            preconditions,
            generic_params,
            self_ty,
            path_ty,
            origin: decl.origin.clone(),
        })
    }

    /// Rewrite the paths in `ty` so they resolve from the discovery call
    /// site rather than from `module`.
    ///
    /// ```text
    /// Widget              (declared here)        -> krate::a::b::Widget
    /// Gear                (use crate::parts::*;) -> krate::parts::Gear
    /// super::Widget                              -> krate::a::Widget
    /// inner::Local        (child module)         -> krate::a::b::inner::Local
    /// Map                 (use std::..::HashMap as Map) -> ::std::..::HashMap
    /// ```
    fn qualify(&self, ty: &Type, module: &[String]) -> Type {
        let mut ty = ty.clone();
        self.qualify_in_place(&mut ty, module);
        ty
    }

    fn qualify_in_place(&self, ty: &mut Type, module: &[String]) {
        match ty {
            Type::Path(type_path) if type_path.qself.is_none() => {
                let path = &mut type_path.path;
                for segment in path.segments.iter_mut() {
                    if let PathArguments::AngleBracketed(args) = &mut segment.arguments {
                        for arg in args.args.iter_mut() {
                            if let GenericArgument::Type(inner) = arg {
                                self.qualify_in_place(inner, module);
                            }
                        }
                    }
                }
                if let Some(resolved) = self.resolve_path(path, module) {
                    *path = resolved;
                }
            }
            Type::Reference(reference) => self.qualify_in_place(&mut reference.elem, module),
            Type::Ptr(ptr) => self.qualify_in_place(&mut ptr.elem, module),
            Type::Slice(slice) => self.qualify_in_place(&mut slice.elem, module),
            Type::Array(array) => self.qualify_in_place(&mut array.elem, module),
            Type::Paren(paren) => self.qualify_in_place(&mut paren.elem, module),
            Type::Group(group) => self.qualify_in_place(&mut group.elem, module),
            Type::Tuple(tuple) => {
                for elem in tuple.elems.iter_mut() {
                    self.qualify_in_place(elem, module);
                }
            }
            _ => {}
        }
    }

    /// `None` leaves the path as written.
    fn resolve_path(&self, path: &syn::Path, module: &[String]) -> Option<syn::Path> {
        if path.leading_colon.is_some() {
            return None;
        }
        let idents: Vec<String> = path.segments.iter().map(|seg| seg.ident.to_string()).collect();

        if let [ident] = idents.as_slice() {
            let last = path.segments.last()?.clone();
            if self.declared.contains(&(module.to_vec(), ident.clone())) {
                return self.absolute(module, &[], last);
            }
            if let Some(target) = self.imports.get(&(module.to_vec(), ident.clone())) {
                return self.resolve_import(module, target, last);
            }
            for glob in self.globs.get(module).into_iter().flatten() {
                if let Some((base, used)) = self.anchor(module, glob) {
                    let mut source = base;
                    source.extend(glob[used..].iter().cloned());
                    if self.declared.contains(&(source.clone(), ident.clone())) {
                        return self.absolute(&source, &[], last);
                    }
                }
            }
            return None;
        }

        if let Some((base, used)) = self.anchor(module, &idents) {
            let mut resolved = self.module_path(&base)?;
            resolved.segments.extend(path.segments.iter().skip(used).cloned());
            return Some(resolved);
        }
        // First segment names an imported module.
        if let Some(target) = self.imports.get(&(module.to_vec(), idents[0].clone())) {
            let mut resolved = match self.anchor(module, target) {
                Some((base, used)) => {
                    let mut full = base;
                    full.extend(target[used..].iter().cloned());
                    self.module_path(&full)?
                }
                None => syn::parse_str(&format!("::{}", target.join("::"))).ok()?,
            };
            resolved.segments.extend(path.segments.iter().skip(1).cloned());
            return Some(resolved);
        }
        // First segment names a module brought in by a glob.
        for glob in self.globs.get(module).into_iter().flatten() {
            if let Some((base, used)) = self.anchor(module, glob) {
                let mut source = base;
                source.extend(glob[used..].iter().cloned());
                let mut nested = source.clone();
                nested.push(idents[0].clone());
                if self.modules.contains(&nested) {
                    let mut resolved = self.module_path(&source)?;
                    resolved.segments.extend(path.segments.iter().cloned());
                    return Some(resolved);
                }
            }
        }
        None
    }

    /// Path for an imported name; the written segment's arguments are kept
    /// on the imported item.
    fn resolve_import(&self, module: &[String], target: &[String], written: syn::PathSegment) -> Option<syn::Path> {
        let (item, parents) = target.split_last()?;
        let mut last = written;
        last.ident = syn::parse_str::<Ident>(item).ok()?;

        match self.anchor(module, parents) {
            Some((base, used)) => self.absolute(&base, &parents[used..], last),
            None => {
                // Extern crate path.
                let mut path: syn::Path = syn::parse_str(&format!("::{}", parents.join("::"))).ok()?;
                path.segments.push(last);
                Some(path)
            }
        }
    }

    /// Crate-relative module a path written in `module` starts from, and
    /// how many of its leading segments that consumed. `None` for paths
    /// into other crates.
    fn anchor(&self, module: &[String], segments: &[String]) -> Option<(Vec<String>, usize)> {
        match segments.first().map(String::as_str) {
            Some("crate") => Some((Vec::new(), 1)),
            Some("self") => Some((module.to_vec(), 1)),
            Some("super") => {
                let ups = segments.iter().take_while(|s| *s == "super").count();
                let keep = module.len().checked_sub(ups)?;
                Some((module[..keep].to_vec(), ups))
            }
            Some(child) => {
                let mut nested = module.to_vec();
                nested.push(child.to_string());
                self.modules.contains(&nested).then(|| (module.to_vec(), 0))
            }
            None => None,
        }
    }

    /// `krate::base::middle::last`
    fn absolute(&self, base: &[String], middle: &[String], last: syn::PathSegment) -> Option<syn::Path> {
        let mut path = self.module_path(base)?;
        for name in middle {
            path.segments.push(syn::parse_str::<Ident>(name).ok()?.into());
        }
        path.segments.push(last);
        Some(path)
    }

    /// `krate::a::b`, or `None` when a module name is not an identifier.
    fn module_path(&self, module: &[String]) -> Option<syn::Path> {
        let mut path = self.krate.clone();
        for name in module {
            let ident = syn::parse_str::<Ident>(name).ok()?;
            path.segments.push(ident.into());
        }
        Some(path)
    }

    fn roots_display(&self) -> String {
        self.roots
            .iter()
            .map(|root| format!("`{}`", root))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Oracle for SourceEnvironment {
    fn enumerate_implementations(&self, capability: &str) -> Result<Vec<Reported>, DiscoveryError> {
        let declarations: Vec<&TraitDecl> = self.traits.iter().filter(|t| t.name == capability).collect();
        if !declarations.is_empty() && !declarations.iter().any(|t| t.is_capability) {
            return Err(DiscoveryError::NotACapability {
                name: capability.to_string(),
                location: declarations[0].origin.location(),
            });
        }

        let candidates: Vec<&ImplDecl> = self
            .impls
            .iter()
            .filter(|decl| trait_name(&decl.item).as_deref() == Some(capability))
            .collect();
        if declarations.is_empty() && candidates.is_empty() {
            return Err(DiscoveryError::MissingCapability {
                name: capability.to_string(),
                roots: self.roots_display(),
            });
        }

        // Unreadable files take their place in file order.
        let mut reported = Vec::new();
        for file in &self.files {
            match &file.ast {
                Err(reason) => reported.push(Reported::Malformed {
                    name: file.display.clone(),
                    origin: Origin::new(file.display.clone(), Vec::new()),
                    reason: format!("cannot read source: {}", reason),
                }),
                Ok(_) => reported.extend(
                    candidates
                        .iter()
                        .filter(|decl| decl.origin.file == file.display)
                        .map(|decl| self.record(decl, capability)),
                ),
            }
        }
        Ok(reported)
    }

    /// `ty` is compared as a qualified path, so pass the type as it
    /// resolves from the call site.
    fn is_implemented_for(&self, capability: &str, ty: &Type) -> Answer {
        let key = type_key(normalize::strip_annotation(ty));
        let known = if capability == TYPEABLE {
            self.typeable.contains(&key)
        } else {
            self.impls.iter().any(|decl| {
                trait_name(&decl.item).as_deref() == Some(capability)
                    && decl.item.generics.params.is_empty()
                    && type_key(&self.qualify(normalize::strip_annotation(&decl.item.self_ty), &decl.origin.module))
                        == key
            })
        };
        if known { Answer::Yes } else { Answer::Deferred }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `use` tree -> `(alias, full path)` pairs and glob sources.
fn flatten_use(
    tree: &UseTree,
    prefix: &mut Vec<String>,
    imported: &mut Vec<(String, Vec<String>)>,
    globbed: &mut Vec<Vec<String>>,
) {
    match tree {
        UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            flatten_use(&path.tree, prefix, imported, globbed);
            prefix.pop();
        }
        UseTree::Name(name) if name.ident == "self" => {
            if let Some(last) = prefix.last() {
                imported.push((last.clone(), prefix.clone()));
            }
        }
        UseTree::Name(name) => {
            let mut full = prefix.clone();
            full.push(name.ident.to_string());
            imported.push((name.ident.to_string(), full));
        }
        UseTree::Rename(rename) => {
            let mut full = prefix.clone();
            full.push(rename.ident.to_string());
            imported.push((rename.rename.to_string(), full));
        }
        UseTree::Glob(_) => globbed.push(prefix.clone()),
        UseTree::Group(group) => {
            for item in &group.items {
                flatten_use(item, prefix, imported, globbed);
            }
        }
    }
}

/// Comparison key for a qualified type.
fn type_key(ty: &Type) -> String {
    ty.to_token_stream().to_string()
}

/// Last segment of an impl's trait path.
fn trait_name(imp: &ItemImpl) -> Option<String> {
    let (_, path, _) = imp.trait_.as_ref()?;
    path.segments.last().map(|seg| seg.ident.to_string())
}

/// `T: Bound` in the spacing used for generic-parameter bounds.
fn render_predicate(predicate: &WherePredicate) -> String {
    match predicate {
        WherePredicate::Type(pred) => format!(
            "{}: {}",
            normalize::canonical_name(&pred.bounded_ty),
            pred.bounds.to_token_stream()
        ),
        WherePredicate::Lifetime(pred) => format!("{}: {}", pred.lifetime, pred.bounds.to_token_stream()),
        other => other.to_token_stream().to_string(),
    }
}

fn is_plain_type(ty: &Type) -> bool {
    !matches!(
        ty,
        Type::Macro(_) | Type::Verbatim(_) | Type::Infer(_) | Type::ImplTrait(_) | Type::Never(_)
    )
}

fn collect_rs_files(path: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let meta = fs::metadata(path).map_err(|err| format!("{}: {}", path.display(), err))?;
    if meta.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    let entries = fs::read_dir(path).map_err(|err| format!("{}: {}", path.display(), err))?;
    for entry in entries {
        let entry = entry.map_err(|err| format!("{}: {}", path.display(), err))?;
        let child = entry.path();
        if child.is_dir() {
            collect_rs_files(&child, out)?;
        } else if child.extension().is_some_and(|ext| ext == "rs") {
            out.push(child);
        }
    }
    Ok(())
}

/// A directory root holding `lib.rs` is a library crate root: its
/// `main.rs` and `bin/` belong to binary targets, whose types cannot be
/// named from the library.
fn skip_binary_targets(root: &Path, found: &mut Vec<PathBuf>) {
    if !root.join("lib.rs").is_file() {
        return;
    }
    let main = root.join("main.rs");
    let bin = root.join("bin");
    found.retain(|path| *path != main && !path.starts_with(&bin));
}

/// Module path of a file below a root directory. A root that is itself a
/// file is the crate root.
fn module_of(root: &Path, file: &Path) -> Vec<String> {
    let relative = file.strip_prefix(root).unwrap_or(Path::new(""));
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if let Some(last) = parts.pop() {
        let stem = last.strip_suffix(".rs").unwrap_or(&last).to_string();
        if !matches!(stem.as_str(), "mod" | "lib" | "main") {
            parts.push(stem);
        }
    }
    parts
}

fn display_path(manifest_dir: &Path, path: &Path) -> String {
    path.strip_prefix(manifest_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPES: &str = r#"
        #[capability]
        pub trait Addable { fn zero() -> Self; }

        impl Addable for i64 { fn zero() -> Self { 0 } }
        impl Addable for String { fn zero() -> Self { String::new() } }
        impl<T: Addable> Addable for Vec<T> { fn zero() -> Self { Vec::new() } }
    "#;

    fn records(env: &SourceEnvironment, capability: &str) -> Vec<Reported> {
        env.enumerate_implementations(capability).unwrap()
    }

    #[test]
    fn test_reports_impls_in_source_order() {
        let env = SourceEnvironment::from_sources(&[("src/lib.rs", "", SHAPES)]);
        let names: Vec<String> = records(&env, "Addable")
            .into_iter()
            .map(|r| match r {
                Reported::Implementation(rec) => normalize::canonical_name(&rec.self_ty),
                Reported::Malformed { name, .. } => name,
            })
            .collect();
        assert_eq!(names, ["i64", "String", "Vec<T>"]);
    }

    #[test]
    fn test_collects_preconditions() {
        let env = SourceEnvironment::from_sources(&[(
            "src/lib.rs",
            "",
            r#"
            #[capability] trait Addable {}
            impl<T: Addable + Clone> Addable for Vec<T> {}
            impl<T> Addable for Option<T> where T: Addable {}
            impl<T> Addable for Box<T> {}
            "#,
        )]);
        let recs: Vec<ImplementationRecord> = records(&env, "Addable")
            .into_iter()
            .filter_map(|r| match r {
                Reported::Implementation(rec) => Some(rec),
                _ => None,
            })
            .collect();
        assert_eq!(recs[0].preconditions, ["T: Addable + Clone"]);
        assert_eq!(recs[1].preconditions, ["T: Addable"]);
        assert!(recs[2].preconditions.is_empty());
        assert_eq!(recs[2].generic_params, ["T"]);
    }

    #[test]
    fn test_missing_capability() {
        let env = SourceEnvironment::from_sources(&[("src/lib.rs", "", SHAPES)]);
        let err = env.enumerate_implementations("Describable").unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingCapability { .. }));
    }

    #[test]
    fn test_trait_without_attribute_is_not_a_capability() {
        let env = SourceEnvironment::from_sources(&[("src/lib.rs", "", "pub trait Plain {} impl Plain for u8 {}")]);
        let err = env.enumerate_implementations("Plain").unwrap_err();
        assert!(matches!(err, DiscoveryError::NotACapability { .. }));
    }

    #[test]
    fn test_impls_without_declaration_are_enumerated() {
        // Capability declared in another crate.
        let env = SourceEnvironment::from_sources(&[("tests/a.rs", "", "impl Foreign for u8 {}")]);
        assert_eq!(records(&env, "Foreign").len(), 1);
    }

    #[test]
    fn test_malformed_reports() {
        let env = SourceEnvironment::from_sources(&[
            (
                "src/lib.rs",
                "",
                r#"
                #[capability] trait Addable {}
                impl Addable<u8> for u16 {}
                impl !Addable for u32 {}
                "#,
            ),
            ("src/broken.rs", "broken", "impl Addable for {"),
        ]);
        let recs = records(&env, "Addable");
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| matches!(r, Reported::Malformed { .. })));
        match &recs[2] {
            Reported::Malformed { reason, .. } => assert!(reason.starts_with("cannot read source")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_cfg_gated_and_nested_items() {
        let env = SourceEnvironment::from_sources(&[(
            "src/lib.rs",
            "",
            r#"
            #[capability] trait Addable {}
            #[cfg(test)]
            mod tests { impl super::Addable for u8 {} }
            mod inner {
                pub struct Local;
                impl super::Addable for Local {}
            }
            "#,
        )]);
        let recs = records(&env, "Addable");
        assert_eq!(recs.len(), 1);
        match &recs[0] {
            Reported::Implementation(rec) => {
                assert_eq!(rec.origin.module, ["inner"]);
                assert_eq!(rec.path_ty.to_token_stream().to_string(), "crate :: inner :: Local");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_qualifies_nested_local_arguments() {
        let env = SourceEnvironment::from_sources(&[(
            "src/shapes.rs",
            "shapes",
            r#"
            pub struct Wrapper<T>(T);
            pub struct Widget;
            impl Addable for Wrapper<Widget> {}
            impl Addable for Vec<u8> {}
            "#,
        )]);
        let recs = records(&env, "Addable");
        let paths: Vec<String> = recs
            .iter()
            .map(|r| match r {
                Reported::Implementation(rec) => rec.path_ty.to_token_stream().to_string(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            paths,
            ["crate :: shapes :: Wrapper < crate :: shapes :: Widget >", "Vec < u8 >"]
        );
    }

    fn path_of(env: &SourceEnvironment, capability: &str) -> Vec<String> {
        records(env, capability)
            .iter()
            .map(|r| match r {
                Reported::Implementation(rec) => rec.path_ty.to_token_stream().to_string(),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_resolves_relative_and_imported_paths() {
        let env = SourceEnvironment::from_sources(&[(
            "src/lib.rs",
            "",
            r#"
            pub struct Widget;
            pub mod parts {
                pub struct Gear;
                pub mod deep { pub struct Bolt; }
            }
            mod a {
                use crate::parts::Gear;
                use super::parts::deep::{self, Bolt as Fastener};
                use std::collections::HashMap as Map;
                impl Cap for super::Widget {}
                impl Cap for Gear {}
                impl Cap for Fastener {}
                impl Cap for deep::Bolt {}
                impl Cap for Map<u8, Gear> {}
            }
            mod b {
                use super::*;
                impl Cap for Widget {}
                impl Cap for parts::Gear {}
                impl Cap for self::Local {}
                pub struct Local;
            }
            "#,
        )]);
        assert_eq!(
            path_of(&env, "Cap"),
            [
                "crate :: Widget",
                "crate :: parts :: Gear",
                "crate :: parts :: deep :: Bolt",
                "crate :: parts :: deep :: Bolt",
                ":: std :: collections :: HashMap < u8 , crate :: parts :: Gear >",
                "crate :: Widget",
                "crate :: parts :: Gear",
                "crate :: b :: Local",
            ]
        );
    }

    #[test]
    fn test_custom_krate_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mod.rs"), "pub struct Root; impl Cap for Root {} pub mod leaf;").unwrap();
        fs::write(dir.path().join("leaf.rs"), "pub struct Leaf; impl super::Cap for Leaf {}").unwrap();

        let krate: syn::Path = syn::parse_quote!(crate::shapes);
        let env = SourceEnvironment::load(dir.path(), &[".".to_string()], krate);
        assert_eq!(
            path_of(&env, "Cap"),
            ["crate :: shapes :: leaf :: Leaf", "crate :: shapes :: Root"]
        );
    }

    #[test]
    fn test_typeable_answers() {
        let env = SourceEnvironment::from_sources(&[(
            "src/lib.rs",
            "",
            r#"
            #[derive(Debug, Typeable)]
            pub struct Widget;
            pub struct Gadget;
            pub struct Gizmo;
            impl tola_evidence::Typeable for Gizmo {}
            #[derive(Typeable)]
            pub struct Holder<T>(T);
            "#,
        )]);
        let ty = |s: &str| syn::parse_str::<Type>(s).unwrap();
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::Widget")), Answer::Yes);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::Gizmo")), Answer::Yes);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::Gadget")), Answer::Deferred);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::Holder<u8>")), Answer::Deferred);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("i64")), Answer::Deferred);
    }

    #[test]
    fn test_typeable_is_keyed_by_module() {
        let env = SourceEnvironment::from_sources(&[(
            "src/lib.rs",
            "",
            r#"
            pub mod a {
                #[derive(tola_evidence::Typeable)]
                pub struct Widget;
            }
            pub mod b {
                pub struct Widget;
                pub struct Gear;
            }
            mod c {
                use super::b::Gear;
                impl tola_evidence::Typeable for Gear {}
            }
            "#,
        )]);
        let ty = |s: &str| syn::parse_str::<Type>(s).unwrap();
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::a::Widget")), Answer::Yes);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::b::Widget")), Answer::Deferred);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("crate::b::Gear")), Answer::Yes);
        assert_eq!(env.is_implemented_for(TYPEABLE, &ty("Widget")), Answer::Deferred);
    }

    #[test]
    fn test_module_of_files() {
        let root = Path::new("/x/src");
        assert!(module_of(root, Path::new("/x/src/lib.rs")).is_empty());
        assert_eq!(module_of(root, Path::new("/x/src/shapes.rs")), ["shapes"]);
        assert_eq!(module_of(root, Path::new("/x/src/shapes/mod.rs")), ["shapes"]);
        assert_eq!(module_of(root, Path::new("/x/src/a/b.rs")), ["a", "b"]);
        assert!(module_of(Path::new("/x/tests/t.rs"), Path::new("/x/tests/t.rs")).is_empty());
    }

    #[test]
    fn test_load_walks_directories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("b")).unwrap();
        fs::write(src.join("lib.rs"), "#[capability] pub trait Cap {}").unwrap();
        fs::write(src.join("b").join("mod.rs"), "pub struct Beta; impl Cap for Beta {}").unwrap();
        fs::write(src.join("a.rs"), "pub struct Alpha; impl Cap for Alpha {}").unwrap();
        fs::write(src.join("notes.txt"), "impl Cap for Ignored {}").unwrap();

        let env = SourceEnvironment::load(dir.path(), &["src".to_string()], syn::parse_quote!(crate));
        assert_eq!(env.tracked_files().len(), 3);

        let paths: Vec<String> = records(&env, "Cap")
            .iter()
            .map(|r| match r {
                Reported::Implementation(rec) => rec.path_ty.to_token_stream().to_string(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(paths, ["crate :: a :: Alpha", "crate :: b :: Beta"]);
    }

    #[test]
    fn test_binary_targets_beside_lib_are_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("lib.rs"), "#[capability] pub trait Cap {} pub struct Lib; impl Cap for Lib {}").unwrap();
        fs::write(src.join("main.rs"), "struct App; impl Cap for App {}").unwrap();
        fs::write(src.join("bin").join("tool.rs"), "struct Tool; impl Cap for Tool {}").unwrap();

        let env = SourceEnvironment::load(dir.path(), &["src".to_string()], syn::parse_quote!(crate));
        assert_eq!(env.tracked_files().len(), 1);
        assert_eq!(path_of(&env, "Cap"), ["crate :: Lib"]);

        // Without a lib.rs, main.rs is the crate root.
        fs::remove_file(src.join("lib.rs")).unwrap();
        let env = SourceEnvironment::load(dir.path(), &["src".to_string()], syn::parse_quote!(crate));
        assert_eq!(env.tracked_files().len(), 2);
    }

    #[test]
    fn test_missing_root_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.rs"), "impl Cap for u8 {}").unwrap();
        let env = SourceEnvironment::load(
            dir.path(),
            &["lib.rs".to_string(), "nowhere".to_string()],
            syn::parse_quote!(crate),
        );
        let recs = records(&env, "Cap");
        assert_eq!(recs.len(), 2);
        assert!(matches!(recs[0], Reported::Implementation(_)));
        assert!(matches!(recs[1], Reported::Malformed { .. }));
    }
}
