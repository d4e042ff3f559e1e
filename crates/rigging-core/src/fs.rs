//! Filesystem primitives shared by the state stores.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;

/// Replace `path` with `bytes` via a synced tmp file and a rename, so readers
/// see either the old content or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent: {}", path.display()))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Path has no file name: {}", path.display()))?;
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create tmp file: {}", tmp_path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write tmp file: {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync tmp file: {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename tmp file: {}", tmp_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_content_and_leaves_no_tmp_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("out.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
