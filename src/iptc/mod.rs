/// Embedded IPTC metadata access
///
/// This module handles:
/// - Splitting JPEG files into marker segments and the APP13 resource block (jpeg.rs)
/// - Reading and writing IIM datasets (iim.rs)
/// - The per-image record the annotator reads, stages changes on, and commits
///
/// Only two fields are exposed: Keywords (2:25) and Caption/Abstract (2:120).
/// Every other dataset and image resource is carried through a commit untouched.

pub mod iim;
pub mod jpeg;

use crate::error::MetadataError;
use iim::{DataSet, RECORD_APPLICATION, RECORD_ENVELOPE};
use jpeg::JpegFile;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::task;

/// The two fields the annotator manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Keywords,
    Caption,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Keywords => f.write_str("keywords"),
            Field::Caption => f.write_str("caption/abstract"),
        }
    }
}

/// Mutable view over one image's keywords and caption
///
/// Changes are staged in memory by the setters and written by `commit`,
/// which consumes the record so it can only happen once.
pub struct MetadataRecord {
    path: PathBuf,
    jpeg: JpegFile,
    datasets: Vec<DataSet>,
    utf8: bool,
    keywords: Vec<String>,
    caption: String,
    keywords_staged: bool,
    caption_staged: bool,
}

impl MetadataRecord {
    /// Load the record of a JPEG file
    ///
    /// A JPEG without any IPTC block opens as an empty record.
    pub fn open(path: &Path) -> Result<Self, MetadataError> {
        let unreadable = |reason: String| MetadataError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        let jpeg = JpegFile::parse(&bytes).map_err(unreadable)?;
        let datasets = match jpeg.iptc_block().map_err(unreadable)? {
            Some(block) => iim::parse(&block).map_err(unreadable)?,
            None => Vec::new(),
        };

        let utf8 = iim::declares_utf8(&datasets);
        let keywords = datasets
            .iter()
            .filter(|ds| ds.is(RECORD_APPLICATION, iim::DS_KEYWORDS))
            .map(|ds| iim::decode_text(&ds.data, utf8))
            .filter(|k| !k.trim().is_empty())
            .collect();
        let caption = datasets
            .iter()
            .find(|ds| ds.is(RECORD_APPLICATION, iim::DS_CAPTION))
            .map(|ds| iim::decode_text(&ds.data, utf8))
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            jpeg,
            datasets,
            utf8,
            keywords,
            caption,
            keywords_staged: false,
            caption_staged: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Whether a field holds no value
    pub fn is_empty(&self, field: Field) -> bool {
        match field {
            Field::Keywords => self.keywords.is_empty(),
            Field::Caption => self.caption.trim().is_empty(),
        }
    }

    /// Stage new keywords, replacing the existing ones
    pub fn set_keywords(&mut self, keywords: Vec<String>) {
        self.keywords = keywords;
        self.keywords_staged = true;
    }

    /// Stage a new caption
    pub fn set_caption(&mut self, caption: String) {
        self.caption = caption;
        self.caption_staged = true;
    }

    pub fn has_staged_changes(&self) -> bool {
        self.keywords_staged || self.caption_staged
    }

    /// Write all staged fields back to the file in one atomic replace
    pub fn commit(mut self) -> Result<(), MetadataError> {
        let datasets = self.rebuild_datasets();
        let block = iim::serialize(&datasets);
        self.jpeg.set_iptc_block(block).map_err(|reason| MetadataError::Write {
            path: self.path.clone(),
            reason,
        })?;

        write_atomic(&self.path, &self.jpeg.to_bytes()).map_err(|e| MetadataError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Dataset list with staged fields applied, UTF-8 declared, in record order
    fn rebuild_datasets(&self) -> Vec<DataSet> {
        let mut datasets: Vec<DataSet> = self
            .datasets
            .iter()
            .filter(|ds| !ds.is(RECORD_ENVELOPE, iim::DS_CODED_CHARSET))
            .filter(|ds| !(self.keywords_staged && ds.is(RECORD_APPLICATION, iim::DS_KEYWORDS)))
            .filter(|ds| !(self.caption_staged && ds.is(RECORD_APPLICATION, iim::DS_CAPTION)))
            .cloned()
            .collect();

        // Legacy text was read as Latin-1; store it as the UTF-8 we now declare.
        // Kept fields keep their text but not their bytes in that case.
        if !self.utf8 {
            for ds in datasets
                .iter_mut()
                .filter(|ds| ds.record == RECORD_APPLICATION && (1..200).contains(&ds.tag))
            {
                if std::str::from_utf8(&ds.data).is_err() {
                    ds.data = iim::decode_text(&ds.data, false).into_bytes();
                }
            }
        }

        datasets.push(DataSet::new(
            RECORD_ENVELOPE,
            iim::DS_CODED_CHARSET,
            iim::CHARSET_UTF8,
        ));
        if !datasets
            .iter()
            .any(|ds| ds.is(RECORD_APPLICATION, iim::DS_RECORD_VERSION))
        {
            datasets.push(DataSet::new(
                RECORD_APPLICATION,
                iim::DS_RECORD_VERSION,
                iim::RECORD_VERSION_4,
            ));
        }

        if self.keywords_staged {
            datasets.extend(
                self.keywords
                    .iter()
                    .map(|k| DataSet::new(RECORD_APPLICATION, iim::DS_KEYWORDS, k.as_bytes())),
            );
        }
        if self.caption_staged && !self.caption.is_empty() {
            datasets.push(DataSet::new(
                RECORD_APPLICATION,
                iim::DS_CAPTION,
                self.caption.as_bytes(),
            ));
        }

        // Records ascend; envelope datasets ascend; the record version opens record 2
        datasets.sort_by_key(|ds| {
            let within = match ds.record {
                RECORD_ENVELOPE => ds.tag as u16,
                _ if ds.tag == iim::DS_RECORD_VERSION => 0,
                _ => 256,
            };
            (ds.record, within)
        });

        datasets
    }
}

impl fmt::Debug for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRecord")
            .field("path", &self.path)
            .field("keywords", &self.keywords)
            .field("caption", &self.caption)
            .field("keywords_staged", &self.keywords_staged)
            .field("caption_staged", &self.caption_staged)
            .finish()
    }
}

/// Open a record off the async runtime
pub async fn open_record(path: PathBuf) -> Result<MetadataRecord, MetadataError> {
    let display = path.clone();
    task::spawn_blocking(move || MetadataRecord::open(&path))
        .await
        .map_err(|e| MetadataError::Unreadable {
            path: display,
            reason: format!("Task join error: {}", e),
        })?
}

/// Commit a record off the async runtime
pub async fn commit_record(record: MetadataRecord) -> Result<(), MetadataError> {
    let display = record.path().to_path_buf();
    task::spawn_blocking(move || record.commit())
        .await
        .map_err(|e| MetadataError::Write {
            path: display,
            reason: format!("Task join error: {}", e),
        })?
}

/// Replace `path` with `bytes` via a temp file in the same directory
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_jpeg_with_iptc, write_plain_jpeg};
    use image::GenericImageView;

    #[test]
    fn test_open_plain_jpeg_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plain_jpeg(dir.path(), "plain.jpg");

        let record = MetadataRecord::open(&path).unwrap();
        assert!(record.is_empty(Field::Keywords));
        assert!(record.is_empty(Field::Caption));
        assert!(!record.has_staged_changes());
    }

    #[test]
    fn test_open_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.jpg");
        fs::write(&text, "hello").unwrap();

        assert!(matches!(
            MetadataRecord::open(&text),
            Err(MetadataError::Unreadable { .. })
        ));
        assert!(matches!(
            MetadataRecord::open(&dir.path().join("missing.jpg")),
            Err(MetadataError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plain_jpeg(dir.path(), "photo.jpg");

        let mut record = MetadataRecord::open(&path).unwrap();
        record.set_keywords(vec!["dog".to_string(), "straße".to_string()]);
        record.set_caption("A dog runs on the Straße.".to_string());
        assert!(record.has_staged_changes());
        record.commit().unwrap();

        let record = MetadataRecord::open(&path).unwrap();
        assert_eq!(record.keywords(), ["dog", "straße"]);
        assert_eq!(record.caption(), "A dog runs on the Straße.");

        // pixels survive the rewrite
        let img = image::open(&path).unwrap();
        assert_eq!(img.dimensions(), (32, 24));
    }

    #[test]
    fn test_commit_replaces_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plain_jpeg(dir.path(), "photo.jpg");

        let mut record = MetadataRecord::open(&path).unwrap();
        record.set_keywords(vec!["one".to_string(), "two".to_string()]);
        record.commit().unwrap();

        let mut record = MetadataRecord::open(&path).unwrap();
        record.set_keywords(vec!["three".to_string()]);
        record.commit().unwrap();

        let record = MetadataRecord::open(&path).unwrap();
        assert_eq!(record.keywords(), ["three"]);
        assert!(record.is_empty(Field::Caption));
    }

    #[test]
    fn test_unstaged_fields_and_foreign_datasets_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg_with_iptc(
            dir.path(),
            "tagged.jpg",
            &[
                DataSet::new(2, 5, "Object name"),
                DataSet::new(2, iim::DS_KEYWORDS, "old"),
                DataSet::new(2, 116, "(c) Someone"),
                DataSet::new(2, iim::DS_CAPTION, "Old caption"),
            ],
        );

        let mut record = MetadataRecord::open(&path).unwrap();
        assert_eq!(record.keywords(), ["old"]);
        record.set_caption("New caption".to_string());
        record.commit().unwrap();

        let record = MetadataRecord::open(&path).unwrap();
        assert_eq!(record.keywords(), ["old"]);
        assert_eq!(record.caption(), "New caption");

        let datasets = record.datasets.clone();
        assert!(datasets.contains(&DataSet::new(2, 5, "Object name")));
        assert!(datasets.contains(&DataSet::new(2, 116, "(c) Someone")));
        assert!(datasets.contains(&DataSet::new(2, iim::DS_KEYWORDS, "old")));
        assert_eq!(datasets[0], DataSet::new(1, iim::DS_CODED_CHARSET, iim::CHARSET_UTF8));
        assert_eq!(datasets[1], DataSet::new(2, 0, iim::RECORD_VERSION_4));
    }

    #[test]
    fn test_latin1_legacy_text_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg_with_iptc(
            dir.path(),
            "legacy.jpg",
            &[DataSet::new(2, iim::DS_CAPTION, vec![b'Z', 0xFC, b'r', b'i', b'c', b'h'])],
        );

        let mut record = MetadataRecord::open(&path).unwrap();
        assert_eq!(record.caption(), "Zürich");
        record.set_keywords(vec!["city".to_string()]);
        record.commit().unwrap();

        let record = MetadataRecord::open(&path).unwrap();
        assert!(record.utf8);
        assert_eq!(record.caption(), "Zürich");
        assert_eq!(record.keywords(), ["city"]);
    }

    #[test]
    fn test_blank_caption_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg_with_iptc(
            dir.path(),
            "blank.jpg",
            &[
                DataSet::new(2, iim::DS_CAPTION, "   "),
                DataSet::new(2, iim::DS_KEYWORDS, ""),
            ],
        );

        let record = MetadataRecord::open(&path).unwrap();
        assert!(record.is_empty(Field::Caption));
        assert!(record.is_empty(Field::Keywords));
    }
}
