//! Local fallback store for rendered invoices.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;

use crate::ports::ArtifactArchive;
use crate::tracker::InvoiceArtifact;

/// Archives one invoice file per order under a directory.
///
/// Writes are atomic (temp file in the same directory, then rename) so a
/// crash mid-write never leaves a truncated invoice behind. Re-archiving
/// the same order replaces the previous file.
pub struct FsArchive {
    dir: PathBuf,
}

impl FsArchive {
    pub fn new(dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn target_path(&self, order_id: &str, artifact: &InvoiceArtifact) -> PathBuf {
        // Order ids come from the application, but never trust them as
        // path components.
        let safe_id: String = order_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let extension = Path::new(&artifact.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("pdf");
        self.dir.join(format!("order-{}.{}", safe_id, extension))
    }

    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("invoice.pdf");
        let tmp_path = self.dir.join(format!(
            ".{}.tavola.tmp.{}",
            file_name,
            std::time::SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));

        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)?;
            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        Ok(())
    }
}

impl ArtifactArchive for FsArchive {
    fn store(&self, order_id: &str, artifact: &InvoiceArtifact) -> std::io::Result<PathBuf> {
        let path = self.target_path(order_id, artifact);
        self.atomic_write(&path, &artifact.bytes)?;
        debug!(order_id = %order_id, path = %path.display(), "archived invoice");
        Ok(path)
    }
}
