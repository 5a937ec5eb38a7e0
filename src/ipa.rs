use crate::error::{LcError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Unpacks a source archive into a destination directory, producing a
/// `Payload/` tree, and reports fractional progress in [0, 1].
pub trait ArchiveExtractor {
    fn extract(
        &self,
        source: &Path,
        dest: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()>;
}

/// The built-in zip-based extractor.
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        source: &Path,
        dest: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let file = File::open(source)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|_| LcError::InvalidArchive)?;

        let has_payload = archive.file_names().any(|name| name.starts_with("Payload/"));
        if !has_payload {
            return Err(LcError::InvalidArchive);
        }

        let total = archive.len();
        progress(0.0);

        for i in 0..total {
            let mut file = archive.by_index(i)?;
            // Entry names are attacker-controlled; anything that would
            // resolve outside the destination is rejected outright.
            let Some(rel) = file.enclosed_name() else {
                return Err(LcError::InvalidArchive);
            };
            let outpath = dest.join(&rel);

            if file.name().ends_with('/') {
                fs::create_dir_all(&outpath)?;
            } else {
                if let Some(p) = outpath.parent() {
                    if !p.exists() {
                        fs::create_dir_all(p)?;
                    }
                }
                let mut outfile = File::create(&outpath)?;
                std::io::copy(&mut file, &mut outfile).map_err(LcError::from_fs_error)?;

                // Preserve Unix permissions
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = file.unix_mode() {
                        fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
                    }
                }
            }

            progress((i + 1) as f64 / total as f64);
        }

        progress(1.0);
        Ok(())
    }
}

/// Finds the first application bundle inside an extracted `Payload/`
/// directory.
pub fn find_app_in_payload(payload: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(payload).map_err(|_| LcError::BundleNotFound)?;
    for entry in entries {
        let entry = entry.map_err(|_| LcError::BundleNotFound)?;
        let path = entry.path();
        if path.is_dir() && path.extension().map(|e| e == "app").unwrap_or(false) {
            return Ok(path);
        }
    }
    Err(LcError::BundleNotFound)
}

/// Moves a bundle directory to its final location. Rename within one
/// volume, copy+delete across volumes.
pub fn move_bundle(src: &Path, dest: &Path) -> Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            copy_dir_all(src, dest)?;
            fs::remove_dir_all(src)?;
            Ok(())
        }
        Err(e) => Err(LcError::from_fs_error(e)),
    }
}

// EXDEV on every unix we care about.
fn libc_exdev() -> i32 {
    18
}

pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else if ty.is_symlink() {
            let target = fs::read_link(&src_path)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, &dst_path)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(target, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(LcError::from_fs_error)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_ipa(path: &Path, with_payload: bool) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        if with_payload {
            zip.add_directory("Payload/", options).unwrap();
            zip.add_directory("Payload/Example.app/", options).unwrap();
            zip.start_file("Payload/Example.app/Info.plist", options)
                .unwrap();
            let mut data = plist::Dictionary::new();
            data.insert(
                "CFBundleIdentifier".to_string(),
                plist::Value::String("com.example.app".to_string()),
            );
            let mut buf = Vec::new();
            plist::to_writer_xml(&mut buf, &data).unwrap();
            zip.write_all(&buf).unwrap();
        } else {
            zip.start_file("README.txt", options).unwrap();
            zip.write_all(b"not an app").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_payload_and_reports_monotonic_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("example.ipa");
        write_ipa(&ipa, true);

        let dest = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        ZipExtractor
            .extract(&ipa, dest.path(), &mut |f| seen.push(f))
            .unwrap();

        assert!(dest.path().join("Payload/Example.app/Info.plist").exists());
        assert_eq!(seen.first().copied(), Some(0.0));
        assert_eq!(seen.last().copied(), Some(1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn archive_without_payload_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("junk.ipa");
        write_ipa(&ipa, false);

        let dest = tempfile::tempdir().unwrap();
        let err = ZipExtractor
            .extract(&ipa, dest.path(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, LcError::InvalidArchive));
    }

    #[test]
    fn entry_escaping_the_destination_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("hostile.ipa");
        let file = File::create(&ipa).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.add_directory("Payload/", options).unwrap();
        zip.start_file("Payload/../../../pwned.txt", options).unwrap();
        zip.write_all(b"escaped").unwrap();
        zip.finish().unwrap();

        let outer = tmp.path().join("outer");
        let dest = outer.join("inner").join("dest");
        fs::create_dir_all(&dest).unwrap();

        let err = ZipExtractor.extract(&ipa, &dest, &mut |_| {}).unwrap_err();
        assert!(matches!(err, LcError::InvalidArchive));
        assert!(!outer.join("pwned.txt").exists());
        assert!(!tmp.path().join("pwned.txt").exists());
    }

    #[test]
    fn payload_path_that_is_a_file_is_bundle_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let payload = tmp.path().join("Payload");
        fs::write(&payload, b"not a directory").unwrap();

        let err = find_app_in_payload(&payload).unwrap_err();
        assert!(matches!(err, LcError::BundleNotFound));
    }

    #[test]
    fn missing_app_dir_is_bundle_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let payload = tmp.path().join("Payload");
        fs::create_dir_all(payload.join("NotAnApp")).unwrap();

        let err = find_app_in_payload(&payload).unwrap_err();
        assert!(matches!(err, LcError::BundleNotFound));
    }
}
