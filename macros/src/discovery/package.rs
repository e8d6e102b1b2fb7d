//! Instance filter and packager.
//!
//! Turns the oracle's reports into packages (one per unconstrained,
//! concrete implementation) and skip records (everything else), keeping
//! the oracle's order for both.

use proc_macro2::TokenStream;
use syn::Type;

use super::oracle::{Answer, DiscoveryError, ImplementationRecord, Oracle, Origin, Reported, TYPEABLE};

/// How a package's identity resolver is produced.
#[derive(Debug, Clone)]
pub enum IdentityPlan {
    /// The oracle confirmed `Typeable` and supplied the resolver.
    Present(TokenStream),
    /// Undecided; `probe_identity!` settles it during type checking.
    Probe,
}

impl IdentityPlan {
    fn kind(&self) -> &'static str {
        match self {
            IdentityPlan::Present(_) => "present",
            IdentityPlan::Probe => "probe",
        }
    }
}

/// One implementation that becomes evidence.
#[derive(Debug, Clone)]
pub struct Package {
    /// Implementing type, resolvable from the call site.
    pub ty: Type,
    /// Canonical name.
    pub name: String,
    pub identity: IdentityPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    Constrained,
    Generic,
    Malformed,
}

impl SkipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipKind::Constrained => "Constrained",
            SkipKind::Generic => "Generic",
            SkipKind::Malformed => "Malformed",
        }
    }
}

/// One implementation that does not.
#[derive(Debug, Clone)]
pub struct Skip {
    pub name: String,
    pub reason: SkipKind,
    pub origin: Origin,
    pub detail: String,
}

impl Skip {
    /// Warning text for the call site.
    pub fn message(&self, capability: &str) -> String {
        match self.reason {
            SkipKind::Constrained => format!(
                "`impl {} for {}` at {} has preconditions ({}); implementations with preconditions are not discovered",
                capability,
                self.name,
                self.origin.location(),
                self.detail
            ),
            SkipKind::Generic => format!(
                "`impl {} for {}` at {} is {}; only implementations for concrete types are discovered",
                capability,
                self.name,
                self.origin.location(),
                self.detail
            ),
            SkipKind::Malformed => format!(
                "ignoring `{}` implementation `{}` at {}: {}",
                capability,
                self.name,
                self.origin.location(),
                self.detail
            ),
        }
    }
}

/// Result of one discovery run.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub capability: String,
    pub packages: Vec<Package>,
    pub skipped: Vec<Skip>,
}

impl Discovery {
    /// Digest of everything the run saw. Equal environments give equal
    /// fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.capability.as_bytes());
        for package in &self.packages {
            hasher.update(b"\0package\0");
            hasher.update(package.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(package.identity.kind().as_bytes());
        }
        for skip in &self.skipped {
            hasher.update(b"\0skip\0");
            hasher.update(skip.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(skip.reason.as_str().as_bytes());
            hasher.update(b"\0");
            hasher.update(skip.detail.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

/// Enumerate, filter and package every implementation of `capability`.
pub fn discover(oracle: &dyn Oracle, capability: &str) -> Result<Discovery, DiscoveryError> {
    let mut packages = Vec::new();
    let mut skipped = Vec::new();

    for reported in oracle.enumerate_implementations(capability)? {
        match reported {
            Reported::Malformed { name, origin, reason } => skipped.push(Skip {
                name,
                reason: SkipKind::Malformed,
                origin,
                detail: reason,
            }),
            Reported::Implementation(record) => match classify(&record) {
                Some((reason, detail)) => skipped.push(Skip {
                    name: oracle.normalize(&record.path_ty),
                    reason,
                    origin: record.origin,
                    detail,
                }),
                None => packages.push(package(oracle, record)),
            },
        }
    }

    Ok(Discovery {
        capability: capability.to_string(),
        packages,
        skipped,
    })
}

/// `None` for a packageable record, otherwise why not.
fn classify(record: &ImplementationRecord) -> Option<(SkipKind, String)> {
    if !record.preconditions.is_empty() {
        return Some((SkipKind::Constrained, record.preconditions.join(", ")));
    }
    if !record.generic_params.is_empty() {
        let params = record
            .generic_params
            .iter()
            .map(|p| format!("`{}`", p))
            .collect::<Vec<_>>()
            .join(", ");
        return Some((SkipKind::Generic, format!("generic over {}", params)));
    }
    None
}

fn package(oracle: &dyn Oracle, record: ImplementationRecord) -> Package {
    let name = oracle.normalize(&record.path_ty);
    let identity = match oracle.is_implemented_for(TYPEABLE, &record.path_ty) {
        Answer::Yes => IdentityPlan::Present(oracle.type_identity_of(&record.path_ty)),
        Answer::Deferred => IdentityPlan::Probe,
    };
    Package {
        ty: record.path_ty,
        name,
        identity,
    }
}
