//! Identity of an executable and the artifacts needed to build a replacement for it.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::{
    constants::*,
    errors::*,
    header::*,
    icon::*,
    manifest::*,
    resource::*,
    version::*,
};

/// Markers of an executable that has already been replaced.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct PatchMarkers {
    /// The embedded manifest declares a launcher identity.
    pub manifest_identity: bool,
    /// A `<stem>_original.exe` backup exists next to the executable.
    pub original_backup:   bool,
}

/// Identity of an executable, read from its headers and resources.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExecutableIdentity {
    pub path:              PathBuf,
    /// Product name, falling back to the file description and then the file stem.
    pub product_name:      String,
    pub company_name:      String,
    /// Product version, falling back to the file version.
    pub version:           String,
    pub file_version:      Option<String>,
    pub product_version:   Option<String>,
    pub description:       Option<String>,
    pub copyright:         Option<String>,
    pub assembly_identity: Option<String>,
    pub icon:              Option<IconContainer>,
    pub machine:           MachineType,
    pub markers:           PatchMarkers,
}

/// Files written for building a replacement executable.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IdentityArtifacts {
    /// Standalone icon file, if the executable has an icon.
    pub icon:     Option<PathBuf>,
    /// Patched application manifest.
    pub manifest: PathBuf,
    /// Assembly identity written to the manifest.
    pub identity: String,
}

impl ExecutableIdentity {
    /// Inspect the executable at the path.
    ///
    /// The file is parsed once. Unreadable or malformed parts are left empty.
    pub fn inspect<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let machine = machine_type(path);
        let resources = ResourceDirectory::from_file(path).unwrap_or_else(|e| {
            warn!("{}: could not read resources: {}", path.display(), e);
            ResourceDirectory::default()
        });
        Self::from_resources(path, &resources, machine)
    }

    /// Build the identity of the executable at the path from an already opened resource source.
    pub fn from_resources<S: ResourceSource + ?Sized>(
        path: &Path, source: &S, machine: MachineType,
    ) -> Self {
        let version_info = VersionInfo::from_resources(source).unwrap_or_else(|e| {
            warn!("{}: could not read version information: {}", path.display(), e);
            None
        });
        let field = |key: &str| version_info.as_ref().and_then(|info| info.string_value(key));

        let stem = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        let product_version = field(VS_PRODUCT_VERSION);
        let file_version = field(VS_FILE_VERSION);
        let description = field(VS_FILE_DESCRIPTION);
        let product_name = field(VS_PRODUCT_NAME)
            .or_else(|| description.clone())
            .unwrap_or_else(|| stem.clone());
        let version = product_version.clone().or_else(|| file_version.clone()).unwrap_or_default();

        let icon = match IconContainer::from_resources(source) {
            Ok(icon) => Some(icon),
            Err(ResourceError::MissingResource(resource)) => {
                debug!("{}: no icon: missing {}", path.display(), resource);
                None
            }
            Err(e) => {
                warn!("{}: could not read icon: {}", path.display(), e);
                None
            }
        };

        let assembly_identity = embedded_manifest(source).and_then(|manifest| {
            assembly_identity(&manifest).unwrap_or_else(|e| {
                warn!("{}: could not parse manifest: {}", path.display(), e);
                None
            })
        });

        let markers = PatchMarkers {
            manifest_identity: assembly_identity.as_deref().is_some_and(is_launcher_identity),
            original_backup:   path.with_file_name(format!("{}_original.exe", stem)).is_file(),
        };

        let identity = Self {
            path: path.to_path_buf(),
            product_name,
            company_name: field(VS_COMPANY_NAME).unwrap_or_default(),
            version,
            file_version,
            product_version,
            description,
            copyright: field(VS_LEGAL_COPYRIGHT),
            assembly_identity,
            icon,
            machine,
            markers,
        };
        debug!(
            "{}: {:?} by {:?} {:?} ({}), icon {}, markers {:?}",
            path.display(),
            identity.product_name,
            identity.company_name,
            identity.version,
            identity.machine,
            identity.icon.is_some(),
            identity.markers
        );
        identity
    }

    /// Returns whether the executable has already been replaced.
    pub fn is_patched(&self) -> bool {
        self.markers.manifest_identity || self.markers.original_backup
    }

    /// Returns the assembly identity derived from the company and product name.
    pub fn derived_identity(&self) -> String { derive_identity(&self.company_name, &self.product_name) }

    /// Returns the numeric four part form of the version, if it contains any digits.
    pub fn numeric_version(&self) -> Option<String> { numeric_file_version(&self.version) }

    /// Write the icon and patched manifest for a replacement executable to the system temporary directory.
    ///
    /// The identity is sanitized, falling back to the derived identity if nothing remains.
    pub fn write_artifacts<P: AsRef<Path>>(
        &self, template: P, identity: &str,
    ) -> Result<IdentityArtifacts, ArtifactError> {
        self.write_artifacts_in(template, identity, std::env::temp_dir())
    }

    /// Write the icon and patched manifest for a replacement executable to the directory.
    pub fn write_artifacts_in<P: AsRef<Path>, D: AsRef<Path>>(
        &self, template: P, identity: &str, directory: D,
    ) -> Result<IdentityArtifacts, ArtifactError> {
        let directory = directory.as_ref();
        let identity = ensure_valid_identity(identity, &self.derived_identity());
        let stem = self.path.file_stem().map(|stem| stem.to_string_lossy()).unwrap_or_default();

        // an error leaves no artifact behind
        let manifest = create_patched_manifest_in(template, &identity, directory)?;
        let icon = match self.icon.as_ref().map(|icon| icon.write_in(directory, &stem)).transpose() {
            Ok(icon) => icon,
            Err(e) => {
                if let Err(remove) = std::fs::remove_file(&manifest) {
                    warn!("{}: could not remove manifest: {}", manifest.display(), remove);
                }
                return Err(e.into());
            }
        };
        Ok(IdentityArtifacts {
            icon,
            manifest,
            identity,
        })
    }
}

fn is_launcher_identity(identity: &str) -> bool {
    identity
        .strip_suffix(LAUNCHER_IDENTITY_SUFFIX)
        .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('.'))
}
