use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomically replace `path` with `content` using write-to-temp-then-rename.
///
/// The destination is never left in a partial state: readers see either the
/// previous file or the complete new one. Missing parent directories are
/// created.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Randomized temp filename so concurrent writers never share a temp file
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // Fails atomically if file exists (prevents symlink race)
        .open(&temp_path)?;

    let written = file.write_all(content).and_then(|()| file.sync_all());
    drop(file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    std::fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_file_and_parents() {
        let dir = std::env::temp_dir().join("sitefeed_fs_test_create");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("nested").join("sitemap.xml");

        write_atomic(&path, b"<urlset/>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<urlset/>");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let dir = std::env::temp_dir().join("sitefeed_fs_test_replace");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("robots.txt");
        std::fs::write(&path, "old content that is longer").unwrap();

        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");

        // No temp files left behind
        let leftovers = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
