use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::Result;

/// Archive name for the parts of `original_filename`: its stem plus `_parts.zip`.
pub fn archive_name(original_filename: &str) -> String {
    let base = Path::new(original_filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base.as_str(),
    };
    format!("{stem}_parts.zip")
}

/// Writes every part into a fresh deflate archive at `zip_path`, keyed by base name.
pub fn zip_parts(parts: &[PathBuf], zip_path: &Path) -> Result<()> {
    let file = File::create(zip_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for part in parts {
        let name = part
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::other(format!("part has no file name: {}", part.display())))?;
        zip.start_file(name, options)?;
        let mut reader = BufReader::new(File::open(part)?);
        io::copy(&mut reader, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_name_drops_only_the_last_extension() {
        assert_eq!(archive_name("holiday.mp4"), "holiday_parts.zip");
        assert_eq!(archive_name("my clip.final.mov"), "my clip.final_parts.zip");
        assert_eq!(archive_name("noext"), "noext_parts.zip");
        assert_eq!(archive_name(".hidden"), ".hidden_parts.zip");
        assert_eq!(archive_name("dir/sub/video.mkv"), "video_parts.zip");
    }

    #[test]
    fn zip_contains_parts_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("part_000.mp4");
        let b = dir.path().join("part_001.mp4");
        std::fs::write(&a, b"first").unwrap();
        std::fs::write(&b, b"second").unwrap();

        let zip_path = dir.path().join("clip_parts.zip");
        zip_parts(&[a, b], &zip_path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut contents = String::new();
        archive
            .by_name("part_001.mp4")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "second");
    }

    #[test]
    fn missing_part_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = zip_parts(
            &[dir.path().join("part_000.mp4")],
            &dir.path().join("out.zip"),
        );
        assert!(result.is_err());
    }
}
