/// Directory traversal
///
/// Walks the target directory recursively (sorted, following links) and hands
/// every JPEG to the annotator, one image at a time. Other files are skipped
/// with a log line; unreadable directory entries are logged and passed over.

use crate::annotate::{Annotator, Disposition};
use crate::vision::client::VisionModel;
use log::{info, warn};
use std::path::Path;
use walkdir::WalkDir;

/// Extensions selected for annotation (compared case-insensitively)
const JPEG_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// Counts for the end-of-run log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalSummary {
    /// JPEGs handed to the annotator
    pub images: usize,
    pub committed: usize,
    pub unchanged: usize,
    pub unreadable: usize,
    pub failed: usize,
    /// Non-JPEG files
    pub skipped: usize,
}

impl TraversalSummary {
    fn record(&mut self, disposition: Disposition) {
        self.images += 1;
        match disposition {
            Disposition::Committed { .. } => self.committed += 1,
            Disposition::SkippedNoChange => self.unchanged += 1,
            Disposition::SkippedUnreadable => self.unreadable += 1,
            Disposition::CommitFailed => self.failed += 1,
        }
    }
}

/// Check if a path names a JPEG by extension
pub fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| JPEG_EXTENSIONS.contains(&ext.as_str()))
}

/// Annotate every JPEG below `root`
pub async fn annotate_tree<M: VisionModel>(
    annotator: &Annotator<'_, M>,
    root: &Path,
) -> TraversalSummary {
    let mut summary = TraversalSummary::default();

    info!("🔍 Scanning folder: {}", root.display());

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️  Cannot read directory entry: {}", e);
                continue;
            }
        };

        // Only process files (not directories)
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_jpeg(path) {
            info!("Annotating: {}", path.display());
            summary.record(annotator.annotate(path).await);
        } else {
            info!("Skipping non-JPEG: {}", path.display());
            summary.skipped += 1;
        }
    }

    info!(
        "✅ Scan complete: {} images ({} annotated, {} unchanged, {} unreadable, {} failed to save), {} other files skipped",
        summary.images,
        summary.committed,
        summary.unchanged,
        summary.unreadable,
        summary.failed,
        summary.skipped
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iptc::iim::{self, DataSet};
    use crate::iptc::MetadataRecord;
    use crate::test_support::{test_config, write_jpeg_with_iptc, write_plain_jpeg, ScriptedModel};
    use std::fs;

    #[test]
    fn test_is_jpeg() {
        assert!(is_jpeg(Path::new("a/b/photo.jpg")));
        assert!(is_jpeg(Path::new("PHOTO.JPG")));
        assert!(is_jpeg(Path::new("scan.Jpeg")));
        assert!(!is_jpeg(Path::new("raw.nef")));
        assert!(!is_jpeg(Path::new("jpg")));
        assert!(!is_jpeg(Path::new("notes.jpg.txt")));
    }

    #[tokio::test]
    async fn test_annotate_tree_visits_nested_jpegs_only() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2024").join("summer");
        fs::create_dir_all(&nested).unwrap();

        let top = write_plain_jpeg(dir.path(), "IMG_0001.JPG");
        let deep = write_plain_jpeg(&nested, "beach.jpeg");
        fs::write(dir.path().join("README.txt"), "not a photo").unwrap();
        fs::write(nested.join("beach.xmp"), "<x:xmpmeta/>").unwrap();

        let config = test_config(dir.path(), false, "en");
        let model = ScriptedModel::new(Ok("sand; sea"), Ok("A sandy beach."));
        let annotator = Annotator::new(&config, &model);

        let summary = annotate_tree(&annotator, dir.path()).await;
        assert_eq!(
            summary,
            TraversalSummary {
                images: 2,
                committed: 2,
                skipped: 2,
                ..TraversalSummary::default()
            }
        );

        for path in [top, deep] {
            let record = MetadataRecord::open(&path).unwrap();
            assert_eq!(record.keywords(), ["sand", "sea"]);
            assert_eq!(record.caption(), "A sandy beach.");
        }
    }

    #[tokio::test]
    async fn test_broken_file_does_not_stop_traversal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_broken.jpg"), b"\xFF\xD8 truncated").unwrap();
        let good = write_plain_jpeg(dir.path(), "b_good.jpg");

        let config = test_config(dir.path(), false, "en");
        let model = ScriptedModel::new(Ok("tree"), Ok("A tree."));
        let annotator = Annotator::new(&config, &model);

        let summary = annotate_tree(&annotator, dir.path()).await;
        assert_eq!(summary.images, 2);
        assert_eq!(summary.unreadable, 1);
        assert_eq!(summary.committed, 1);
        assert_eq!(MetadataRecord::open(&good).unwrap().keywords(), ["tree"]);
    }

    #[tokio::test]
    async fn test_summary_counts_each_disposition() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = write_plain_jpeg(dir.path(), "a_fresh.jpg");
        write_jpeg_with_iptc(
            dir.path(),
            "b_tagged.jpg",
            &[
                DataSet::new(2, iim::DS_KEYWORDS, "kept"),
                DataSet::new(2, iim::DS_CAPTION, "Kept."),
            ],
        );
        fs::write(dir.path().join("c_empty.jpg"), b"").unwrap();

        let config = test_config(dir.path(), false, "en");
        let model = ScriptedModel::new(Ok("lake"), Ok("A lake."));
        let annotator = Annotator::new(&config, &model);

        let summary = annotate_tree(&annotator, dir.path()).await;
        assert_eq!(
            summary,
            TraversalSummary {
                images: 3,
                committed: 1,
                unchanged: 1,
                unreadable: 1,
                failed: 0,
                skipped: 0,
            }
        );
        assert_eq!(MetadataRecord::open(&fresh).unwrap().caption(), "A lake.");
    }
}
