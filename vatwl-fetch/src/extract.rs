//! Unpacking the published `.7z` archive.
//!
//! The implementation is picked from [`ExtractorKind`] in the configuration.
//! Asking for [`ExtractorKind::Native`] in a build without the `native-7z`
//! feature is an error, not a silent fallback.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::{ExtractorKind, FetchConfig};
use crate::error::Error;

/// Something that can unpack an archive into a directory.
pub trait Extractor: Send + Sync {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), Error>;
}

/// Returns the extractor selected by `config`.
pub fn extractor_for(config: &FetchConfig) -> Result<Box<dyn Extractor>, Error> {
    match config.extractor {
        ExtractorKind::Subprocess => {
            Ok(Box::new(SubprocessExtractor::new(config.seven_zip_path.clone())))
        }
        #[cfg(feature = "native-7z")]
        ExtractorKind::Native => Ok(Box::new(NativeExtractor)),
        #[cfg(not(feature = "native-7z"))]
        ExtractorKind::Native => Err(Error::extraction(
            "native 7z extraction requested but vatwl-fetch was built without the native-7z feature",
        )),
    }
}

/// Runs `7z x <archive> -o<dest> -y`.
#[derive(Debug, Clone)]
pub struct SubprocessExtractor {
    program: PathBuf,
}

impl SubprocessExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Extractor for SubprocessExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), Error> {
        let mut out_flag = std::ffi::OsString::from("-o");
        out_flag.push(dest.as_os_str());

        debug!(program = %self.program.display(), archive = %archive.display(), "running 7z");
        let output = Command::new(&self.program)
            .arg("x")
            .arg(archive)
            .arg(out_flag)
            .arg("-y")
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::extraction(format!(
                    "7z executable '{}' not found; install 7-Zip or build with the native-7z feature",
                    self.program.display()
                )),
                _ => Error::extraction(format!("failed to run '{}': {e}", self.program.display())),
            })?;

        if !output.status.success() {
            return Err(Error::extraction(format!(
                "'{}' exited with {}. STDOUT:\n{}\nSTDERR:\n{}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            )));
        }
        Ok(())
    }
}

/// Pure Rust extraction through `sevenz-rust`.
#[cfg(feature = "native-7z")]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeExtractor;

#[cfg(feature = "native-7z")]
impl Extractor for NativeExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), Error> {
        sevenz_rust::decompress_file(archive, dest)
            .map_err(|e| Error::extraction(format!("{}: {e}", archive.display())))
    }
}
