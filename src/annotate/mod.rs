/// Per-image annotation
///
/// For one image: decide which fields need generating, ask the model once per
/// field, normalize the answers and commit whatever was learned. The two fields
/// are independent; a failure on one never blocks the other. Nothing in here
/// returns an error to the caller; every failure ends up in the log.

pub mod normalize;
pub mod translate;

use crate::config::{Configuration, LanguageCode};
use crate::error::{InferenceError, TranslationError};
use crate::iptc::{self, Field};
use crate::vision::client::VisionModel;
use crate::vision::preprocess::{self, ImagePayload};
use log::{error, info, warn};
use normalize::{normalize_caption, normalize_keywords};
use std::fmt;
use std::path::Path;

pub const KEYWORDS_PROMPT: &str = "Please give five keywords describing this picture, separated by ;. Nothing else, just five keywords separated by semicolons. Thank you!";

pub const CAPTION_PROMPT: &str = "Please give a short concise abstract describing this picture in one sentence. Nothing else, just the abstract in one sentence. Thank you!";

/// Why a field was not generated
#[derive(Debug)]
pub enum SkipReason {
    Inference(InferenceError),
    Translation(TranslationError),
    /// The model answered with nothing usable
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Inference(e) => write!(f, "{}", e),
            SkipReason::Translation(e) => write!(f, "{}", e),
            SkipReason::Empty => f.write_str("model returned no usable text"),
        }
    }
}

/// Result of handling one field
#[derive(Debug)]
pub enum FieldOutcome<T> {
    /// A new value to stage
    Generated(T),
    /// The field already had a value and overwrite is off; the model was not asked
    Kept,
    Skipped(SkipReason),
}

impl<T> FieldOutcome<T> {
    pub fn is_generated(&self) -> bool {
        matches!(self, FieldOutcome::Generated(_))
    }
}

/// Which fields a commit will write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationOutcome {
    pub keywords_written: bool,
    pub caption_written: bool,
}

impl AnnotationOutcome {
    pub fn from_fields<K, C>(keywords: &FieldOutcome<K>, caption: &FieldOutcome<C>) -> Self {
        Self {
            keywords_written: keywords.is_generated(),
            caption_written: caption.is_generated(),
        }
    }

    pub fn needs_commit(&self) -> bool {
        self.keywords_written || self.caption_written
    }
}

/// Terminal state of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Committed { keywords: bool, caption: bool },
    SkippedNoChange,
    SkippedUnreadable,
    CommitFailed,
}

/// Drives the model over single images
pub struct Annotator<'a, M> {
    config: &'a Configuration,
    model: M,
}

impl<'a, M: VisionModel> Annotator<'a, M> {
    pub fn new(config: &'a Configuration, model: M) -> Self {
        Self { config, model }
    }

    /// Annotate one image. Never fails; the outcome is logged and returned.
    pub async fn annotate(&self, path: &Path) -> Disposition {
        let Some(payload) = preprocess::prepare(path.to_path_buf()).await else {
            error!("Input image {} not found or not decodable.", path.display());
            return Disposition::SkippedUnreadable;
        };

        let mut record = match iptc::open_record(path.to_path_buf()).await {
            Ok(record) => record,
            Err(e) => {
                error!("{}", e);
                return Disposition::SkippedUnreadable;
            }
        };

        let want_keywords = self.wants(&record, Field::Keywords, path);
        let want_caption = self.wants(&record, Field::Caption, path);

        // Independent requests; results are still reported keywords first
        let (keywords, caption) = tokio::join!(
            self.generate(
                want_keywords,
                KEYWORDS_PROMPT,
                &payload,
                normalize_keywords,
                Vec::is_empty
            ),
            self.generate(
                want_caption,
                CAPTION_PROMPT,
                &payload,
                normalize_caption,
                String::is_empty
            ),
        );
        drop(payload);

        let outcome = AnnotationOutcome::from_fields(&keywords, &caption);

        match keywords {
            FieldOutcome::Generated(keywords) => {
                info!("New keywords: {:?}.", keywords);
                record.set_keywords(keywords);
            }
            FieldOutcome::Skipped(reason) => error!(
                "Error annotating image {} with {}: {}.",
                path.display(),
                Field::Keywords,
                reason
            ),
            FieldOutcome::Kept => {}
        }

        match caption {
            FieldOutcome::Generated(caption) => {
                info!("New caption/abstract: {}.", caption);
                record.set_caption(caption);
            }
            FieldOutcome::Skipped(reason) => error!(
                "Error annotating image {} with {}: {}.",
                path.display(),
                Field::Caption,
                reason
            ),
            FieldOutcome::Kept => {}
        }

        debug_assert_eq!(outcome.needs_commit(), record.has_staged_changes());
        if !outcome.needs_commit() {
            warn!("No changes made to {}.", path.display());
            return Disposition::SkippedNoChange;
        }

        match iptc::commit_record(record).await {
            Ok(()) => {
                info!("💾 Saved IPTC metadata to {}", path.display());
                Disposition::Committed {
                    keywords: outcome.keywords_written,
                    caption: outcome.caption_written,
                }
            }
            Err(e) => {
                error!("{}", e);
                Disposition::CommitFailed
            }
        }
    }

    /// Whether a field should be (re)generated
    fn wants(&self, record: &iptc::MetadataRecord, field: Field, path: &Path) -> bool {
        if self.config.overwrite || record.is_empty(field) {
            return true;
        }
        info!(
            "{} found in {}. Will not overwrite unless --overwrite is set.",
            field,
            path.display()
        );
        false
    }

    /// Ask the model for one field and normalize the answer
    async fn generate<T>(
        &self,
        wanted: bool,
        prompt: &str,
        payload: &ImagePayload,
        normalize: fn(&str, &LanguageCode) -> Result<T, TranslationError>,
        is_empty: fn(&T) -> bool,
    ) -> FieldOutcome<T> {
        if !wanted {
            return FieldOutcome::Kept;
        }

        let raw = match self.model.complete(prompt, payload).await {
            Ok(raw) => raw,
            Err(e) => return FieldOutcome::Skipped(SkipReason::Inference(e)),
        };

        match normalize(&raw, &self.config.language) {
            Ok(value) if is_empty(&value) => FieldOutcome::Skipped(SkipReason::Empty),
            Ok(value) => FieldOutcome::Generated(value),
            Err(e) => FieldOutcome::Skipped(SkipReason::Translation(e)),
        }
    }
}
