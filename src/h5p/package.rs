use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use serde_json::Value;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, H5pError};

/// Package manifest at the archive root
pub const MANIFEST_PATH: &str = "h5p.json";

const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

/// One archive member kept in memory
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
    compression: CompressionMethod,
}

/// An H5P archive loaded into memory, entries kept in their original order
#[derive(Debug, Clone)]
pub struct H5pPackage {
    source: PathBuf,
    content_path: String,
    entries: Vec<PackageEntry>,
}

impl H5pPackage {
    /// Read an .h5p archive and check that it carries a content document
    pub fn open<P: AsRef<Path>>(path: P, content_path: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(H5pError::FileNotFound(path.display().to_string()));
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| H5pError::Package(format!("{} is not a zip archive: {}", path.display(), e)))?;

        let mut entries = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let mut member = archive.by_index(idx)?;
            // Header sizes are untrusted; never preallocate more than this
            let mut data = Vec::with_capacity(member.size().min(PREALLOC_LIMIT) as usize);
            member.read_to_end(&mut data)?;
            entries.push(PackageEntry {
                name: member.name().to_string(),
                is_dir: member.is_dir(),
                compression: member.compression(),
                data,
            });
        }

        let package = Self {
            source: path.to_path_buf(),
            content_path: content_path.to_string(),
            entries,
        };

        if package.entry(content_path).is_none() {
            return Err(H5pError::Package(format!(
                "{} has no {}",
                path.display(),
                content_path
            )));
        }
        package.manifest()?;

        info!("[OK] Extracted H5P: {} ({} entries)", path.display(), package.entries.len());
        Ok(package)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.iter().find(|e| !e.is_dir && e.name == name)
    }

    /// Parsed content/content.json
    pub fn content_json(&self) -> Result<Value> {
        self.read_json(&self.content_path)?
            .ok_or_else(|| H5pError::Package(format!("missing {}", self.content_path)))
    }

    pub fn set_content_json(&mut self, value: &Value, pretty: bool) -> Result<()> {
        let path = self.content_path.clone();
        self.write_json(&path, value, pretty)
    }

    /// Parsed h5p.json, if the archive has one
    pub fn manifest(&self) -> Result<Option<Value>> {
        self.read_json(MANIFEST_PATH)
    }

    pub fn set_manifest(&mut self, value: &Value) -> Result<()> {
        // h5p.json is conventionally compact
        self.write_json(MANIFEST_PATH, value, false)
    }

    fn read_json(&self, name: &str) -> Result<Option<Value>> {
        let Some(entry) = self.entry(name) else {
            return Ok(None);
        };
        let bytes = entry.data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&entry.data);
        let value = serde_json::from_slice(bytes)
            .map_err(|e| H5pError::Package(format!("{} is not valid JSON: {}", name, e)))?;
        Ok(Some(value))
    }

    fn write_json(&mut self, name: &str, value: &Value, pretty: bool) -> Result<()> {
        let data = if pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };

        match self.entries.iter_mut().find(|e| !e.is_dir && e.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(PackageEntry {
                name: name.to_string(),
                data,
                is_dir: false,
                compression: CompressionMethod::Deflated,
            }),
        }
        Ok(())
    }

    /// Write the archive; the destination is replaced only once it is complete
    pub fn write<P: AsRef<Path>>(&self, output: P) -> Result<()> {
        let output = output.as_ref();
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut zip = ZipWriter::new(temp.as_file_mut());
            for entry in &self.entries {
                // Already-compressed media stays stored; everything else is deflated
                let method = match entry.compression {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                let options = SimpleFileOptions::default()
                    .compression_method(method)
                    .large_file(entry.data.len() as u64 >= u32::MAX as u64);

                if entry.is_dir {
                    zip.add_directory(entry.name.as_str(), options)?;
                } else {
                    zip.start_file(entry.name.as_str(), options)?;
                    zip.write_all(&entry.data)?;
                }
            }
            zip.finish()?;
        }

        temp.persist(output).map_err(|e| H5pError::Io(e.error))?;
        debug!("Wrote {} entries to {}", self.entries.len(), output.display());
        Ok(())
    }

    /// Extract every entry below `dir`, for inspecting a translation by hand
    pub fn export_raw<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut written = 0;
        for entry in &self.entries {
            let relative = safe_relative_path(&entry.name).ok_or_else(|| {
                H5pError::Package(format!("unsafe entry name in archive: {}", entry.name))
            })?;
            let target = dir.join(relative);

            if entry.is_dir {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &entry.data)?;
            written += 1;
        }

        info!("Exported {} files to {}", written, dir.display());
        Ok(written)
    }
}

/// Archive names must stay inside the extraction directory
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(relative)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Build a small H5P archive on disk
    pub(crate) fn write_fixture(path: &Path, content: &Value) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        zip.start_file("h5p.json", deflated).unwrap();
        zip.write_all(br#"{"title":"Lab safety","language":"en","mainLibrary":"H5P.MultiChoice"}"#)
            .unwrap();
        zip.add_directory("content/", deflated).unwrap();
        zip.start_file("content/content.json", deflated).unwrap();
        zip.write_all(content.to_string().as_bytes()).unwrap();
        zip.add_directory("content/images/", deflated).unwrap();
        zip.start_file("content/images/lab.png", stored).unwrap();
        zip.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_open_and_read_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.h5p");
        write_fixture(&path, &json!({ "question": "Ready?" }));

        let package = H5pPackage::open(&path, "content/content.json").unwrap();
        assert_eq!(
            package.entry_names(),
            vec!["h5p.json", "content/", "content/content.json", "content/images/", "content/images/lab.png"]
        );
        assert_eq!(package.content_json().unwrap()["question"], "Ready?");
        assert_eq!(package.manifest().unwrap().unwrap()["language"], "en");
    }

    #[test]
    fn test_open_rejects_missing_content() {
        let dir = tempfile::tempdir().unwrap();

        let missing = H5pPackage::open(dir.path().join("nope.h5p"), "content/content.json");
        assert!(matches!(missing, Err(H5pError::FileNotFound(_))));

        let not_zip = dir.path().join("plain.h5p");
        std::fs::write(&not_zip, "not a zip").unwrap();
        assert!(matches!(
            H5pPackage::open(&not_zip, "content/content.json"),
            Err(H5pError::Package(_))
        ));

        let path = dir.path().join("lab.h5p");
        write_fixture(&path, &json!({}));
        assert!(matches!(
            H5pPackage::open(&path, "content/other.json"),
            Err(H5pError::Package(_))
        ));

        let corrupt = dir.path().join("corrupt.h5p");
        let mut zip = ZipWriter::new(File::create(&corrupt).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("h5p.json", options).unwrap();
        zip.write_all(b"{not json").unwrap();
        zip.start_file("content/content.json", options).unwrap();
        zip.write_all(b"{}").unwrap();
        zip.finish().unwrap();
        let err = H5pPackage::open(&corrupt, "content/content.json").unwrap_err();
        assert!(matches!(err, H5pError::Package(_)));
        assert!(err.to_string().contains("h5p.json"));
    }

    #[test]
    fn test_open_ignores_inflated_header_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.h5p");
        write_fixture(&path, &json!({ "question": "Ready?" }));

        // Claim a ~4 GiB uncompressed size for every central directory record
        let mut bytes = std::fs::read(&path).unwrap();
        let mut pos = 0;
        while let Some(offset) = bytes[pos..].windows(4).position(|w| w == b"PK\x01\x02") {
            let header = pos + offset;
            bytes[header + 24..header + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
            pos = header + 4;
        }
        std::fs::write(&path, &bytes).unwrap();

        match H5pPackage::open(&path, "content/content.json") {
            Ok(package) => {
                assert_eq!(package.entry("content/images/lab.png").unwrap().data, vec![0x89, b'P', b'N', b'G']);
            }
            Err(e) => assert!(matches!(e, H5pError::Zip(_) | H5pError::Io(_) | H5pError::Package(_))),
        }
    }

    #[test]
    fn test_write_preserves_entries_and_updates_content() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lab.h5p");
        let output = dir.path().join("out/lab_translated.h5p");
        write_fixture(&input, &json!({ "question": "Ready?" }));

        let mut package = H5pPackage::open(&input, "content/content.json").unwrap();
        package
            .set_content_json(&json!({ "question": "Bereit? Übung" }), true)
            .unwrap();
        package.write(&output).unwrap();

        let reopened = H5pPackage::open(&output, "content/content.json").unwrap();
        assert_eq!(reopened.entry_names(), package.entry_names());
        assert_eq!(reopened.content_json().unwrap()["question"], "Bereit? Übung");

        let raw = &reopened.entry("content/content.json").unwrap().data;
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("\n  \"question\""));
        assert!(text.contains("Übung"));
        assert_eq!(reopened.entry("content/images/lab.png").unwrap().data, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_export_raw() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lab.h5p");
        write_fixture(&input, &json!({ "question": "Ready?" }));

        let package = H5pPackage::open(&input, "content/content.json").unwrap();
        let export_dir = dir.path().join("raw");
        assert_eq!(package.export_raw(&export_dir).unwrap(), 3);
        assert!(export_dir.join("content/images/lab.png").is_file());
        assert!(export_dir.join("h5p.json").is_file());
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(safe_relative_path("content/a.json"), Some(PathBuf::from("content/a.json")));
        assert_eq!(safe_relative_path("../evil"), None);
        assert_eq!(safe_relative_path("/etc/passwd"), None);
    }
}
