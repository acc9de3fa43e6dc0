//! Conversion of BMG (localized message) blobs into text.
//!
//! Decoding the BMG format itself is left to Wiimm's `wbmgt` tool, which exports messages as
//! one `[ID] = text` directive per line.

use easyerr::{Error, ResultExt};
use std::{
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

#[derive(Debug, Error)]
pub enum BmgError {
    #[error(transparent)]
    Io { source: std::io::Error },
    #[error(transparent)]
    Spawn { source: std::io::Error },
    #[error("text decoder exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("text decoder reported an error: {stderr}")]
    Stderr { stderr: String },
    #[error(transparent)]
    Utf8 { source: std::string::FromUtf8Error },
}

/// Something which turns a BMG blob (header included) into text lines.
pub trait TextDecoder {
    fn decode(&self, bmg: &[u8]) -> Result<String, BmgError>;
}

/// Decodes BMG blobs by running `wbmgt` in a scratch directory.
#[derive(Debug, Clone)]
pub struct Wbmgt {
    program: PathBuf,
}

impl Wbmgt {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for Wbmgt {
    fn default() -> Self {
        Self::new("wbmgt")
    }
}

impl TextDecoder for Wbmgt {
    fn decode(&self, bmg: &[u8]) -> Result<String, BmgError> {
        let dir = tempfile::tempdir().context(BmgCtx::Io)?;
        std::fs::write(dir.path().join("bmg.bmg"), bmg).context(BmgCtx::Io)?;

        // the child runs inside the scratch directory, so relative paths must be resolved here
        let program = if self.program.components().count() > 1 {
            std::path::absolute(&self.program).context(BmgCtx::Io)?
        } else {
            self.program.clone()
        };

        tracing::debug!(program = %program.display(), len = bmg.len(), "running text decoder");
        let output = Command::new(&program)
            .args(["decode", "bmg.bmg", "--no-header", "--export"])
            .current_dir(dir.path())
            .output()
            .context(BmgCtx::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if !output.status.success() {
            return Err(BmgError::Failed {
                status: output.status,
                stderr,
            });
        }

        if !stderr.is_empty() {
            return Err(BmgError::Stderr { stderr });
        }

        let text = std::fs::read(dir.path().join("bmg.txt")).context(BmgCtx::Io)?;
        String::from_utf8(text).context(BmgCtx::Utf8)
    }
}
