//! Artifact output
//!
//! Writes a converted bundle as three PEM files into one output directory.
//! Collisions are checked for all three targets before anything is written.

use crate::cert_ops::convert::{self, ArtifactRole, CredentialBundle};
use crate::config::OutputSettings;
use crate::utils::{self, CertFileError};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Resolved target paths for one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub cert: PathBuf,
    pub chain: PathBuf,
}

/// One file written by [`write_bundle`]
#[derive(Debug, Clone, Serialize)]
pub struct WrittenArtifact {
    pub role: ArtifactRole,
    pub path: PathBuf,
    pub bytes: usize,
}

impl OutputPlan {
    pub fn new(dir: PathBuf, names: &OutputSettings) -> Self {
        Self {
            key: dir.join(&names.key_file),
            cert: dir.join(&names.cert_file),
            chain: dir.join(&names.chain_file),
            dir,
        }
    }

    pub fn path_for(&self, role: ArtifactRole) -> &Path {
        match role {
            ArtifactRole::PrivateKey => &self.key,
            ArtifactRole::Certificate => &self.cert,
            ArtifactRole::Chain => &self.chain,
        }
    }

    /// Fails on the first target that already exists, unless `force`
    pub fn check_collisions(&self, force: bool) -> Result<(), CertFileError> {
        if force {
            return Ok(());
        }
        for path in [&self.key, &self.cert, &self.chain] {
            if path.exists() {
                return Err(CertFileError::OutputExists {
                    path: path.display().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `<stem><suffix>` next to the container
pub fn default_output_dir(container: &Path, suffix: &str) -> PathBuf {
    let stem = container
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    let parent = container.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{}{}", stem, suffix))
}

/// Create the output directory and write the three artifacts.
///
/// The chain file is written even when empty. The key file is created
/// owner-readable only on Unix.
pub fn write_bundle(
    plan: &OutputPlan,
    bundle: &CredentialBundle,
    force: bool,
) -> Result<Vec<WrittenArtifact>, CertFileError> {
    plan.check_collisions(force)?;

    std::fs::create_dir_all(&plan.dir).map_err(|e| CertFileError::FileWriteError {
        path: plan.dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut written: Vec<WrittenArtifact> = Vec::with_capacity(3);
    for artifact in bundle.artifacts() {
        let path = plan.path_for(artifact.role);
        let secret = artifact.role == ArtifactRole::PrivateKey;
        if let Err(e) = write_file(path, artifact.contents, secret) {
            remove_partial(&written, path);
            return Err(CertFileError::FileWriteError {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
        tracing::debug!(role = %artifact.role, path = %path.display(), "artifact written");
        written.push(WrittenArtifact {
            role: artifact.role,
            path: path.to_path_buf(),
            bytes: artifact.contents.len(),
        });
    }

    Ok(written)
}

/// Removes this run's artifacts after a failed write, so no unencrypted key
/// is left next to a missing certificate.
fn remove_partial(written: &[WrittenArtifact], failed: &Path) {
    let failed = failed.is_file().then_some(failed);
    for path in written.iter().map(|a| a.path.as_path()).chain(failed) {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "could not remove partial output");
        }
    }
}

/// Convert container bytes and write the artifacts; nothing is written
/// unless conversion succeeds.
pub fn convert_to_files(
    container: &[u8],
    password: &str,
    plan: &OutputPlan,
    force: bool,
) -> utils::Result<(CredentialBundle, Vec<WrittenArtifact>)> {
    let bundle = convert::convert(container, password)?;
    let written = write_bundle(plan, &bundle, force)?;
    Ok((bundle, written))
}

fn write_file(path: &Path, contents: &[u8], secret: bool) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        if secret {
            opts.mode(0o600);
        }
    }

    let mut file = opts.open(path)?;

    // mode() only applies on creation; an overwritten key file keeps its old bits
    #[cfg(unix)]
    {
        if secret {
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
    }
    #[cfg(not(unix))]
    let _ = secret;

    file.write_all(contents)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ToolkitError;

    #[test]
    fn test_default_output_dir() {
        assert_eq!(
            default_output_dir(Path::new("/tmp/in/server.pfx"), "_certs"),
            PathBuf::from("/tmp/in/server_certs")
        );
        assert_eq!(
            default_output_dir(Path::new("bundle.p12"), "_pem"),
            PathBuf::from("bundle_pem")
        );
    }

    #[test]
    fn test_plan_uses_configured_names() {
        let plan = OutputPlan::new(PathBuf::from("out"), &OutputSettings::default());
        assert_eq!(plan.key, PathBuf::from("out/private_key.pem"));
        assert_eq!(plan.cert, PathBuf::from("out/certificate.pem"));
        assert_eq!(plan.chain, PathBuf::from("out/certificate_chain.pem"));
        assert_eq!(plan.path_for(ArtifactRole::Chain), plan.chain.as_path());
    }

    #[test]
    fn test_collision_check() {
        let dir = tempfile::tempdir().unwrap();
        let plan = OutputPlan::new(dir.path().to_path_buf(), &OutputSettings::default());
        assert!(plan.check_collisions(false).is_ok());

        std::fs::write(&plan.chain, b"").unwrap();
        assert!(matches!(
            plan.check_collisions(false),
            Err(CertFileError::OutputExists { .. })
        ));
        assert!(plan.check_collisions(true).is_ok());
    }

    #[test]
    fn test_failed_conversion_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let plan = OutputPlan::new(dir.path().join("out"), &OutputSettings::default());
        let container = include_bytes!("../../tests/fixtures/bundle-aes.pfx");

        let err = convert_to_files(container, "battery staple", &plan, false).unwrap_err();
        assert!(matches!(err, ToolkitError::Convert(_)));
        assert!(!plan.dir.exists());

        let (bundle, written) = convert_to_files(container, "correct horse", &plan, false).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[2].bytes, bundle.chain_pem().len());
        assert_eq!(std::fs::read(&plan.cert).unwrap(), bundle.cert_pem());
    }

    #[test]
    fn test_failed_write_removes_earlier_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let plan = OutputPlan::new(dir.path().join("out"), &OutputSettings::default());
        let container = include_bytes!("../../tests/fixtures/bundle-aes.pfx");
        let bundle = convert::convert(container, "correct horse").unwrap();

        // a directory where the certificate should go fails its write
        std::fs::create_dir_all(&plan.cert).unwrap();

        let err = write_bundle(&plan, &bundle, true).unwrap_err();
        match err {
            CertFileError::FileWriteError { path, .. } => {
                assert_eq!(path, plan.cert.display().to_string())
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!plan.key.exists());
        assert!(!plan.chain.exists());
        assert!(plan.cert.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_file_mode_is_tightened_on_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, b"old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_file(&path, b"new", true).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
