use anyhow::{bail, Result};
use fs_err as fs;
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{csr::GeneratedCsr, response::CertificateId};

/// Where generated CSRs and their private keys are written.
///
/// Layout: `<dir>/<certificate id>/{csr.pem,key.pem}`, or `<dir>/{csr.pem,key.pem}`
/// for requests not tied to a certificate.
#[derive(Debug, Clone)]
pub struct OutputDir {
    dir: PathBuf,
}

impl OutputDir {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn certificate_dir(&self, certificate_id: &CertificateId) -> Result<PathBuf> {
        let id = certificate_id.as_str();
        if id.contains(['/', '\\']) || id.starts_with('.') {
            bail!("certificate id {id:?} is not usable as a directory name");
        }
        Ok(self.dir.join(id))
    }

    /// Store the CSR and key for a certificate. Returns the directory written to.
    pub fn store(&self, certificate_id: &CertificateId, csr: &GeneratedCsr) -> Result<PathBuf> {
        let dir = self.certificate_dir(certificate_id)?;
        write_pair(&dir, csr)?;
        Ok(dir)
    }

    /// Store a CSR and key directly under the output directory.
    pub fn store_standalone(&self, csr: &GeneratedCsr) -> Result<PathBuf> {
        write_pair(&self.dir, csr)?;
        Ok(self.dir.clone())
    }
}

fn write_pair(dir: &Path, csr: &GeneratedCsr) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("csr.pem"), &csr.csr_pem)?;
    write_private(&dir.join("key.pem"), &csr.key_pem)?;
    debug!("stored csr and key in {}", dir.display());
    Ok(())
}

/// Write a file only the owner can read. The mode is applied before any content lands.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use fs_err::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // An existing file keeps its old mode on open.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents.as_bytes())?;
    Ok(())
}
