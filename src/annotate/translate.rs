/// Translation stage
///
/// The model answers in English. Any other target language is reported as
/// unsupported so the annotator skips that field, until a real translation
/// backend is plugged in here.

use crate::config::LanguageCode;
use crate::error::TranslationError;

/// Translate `text` into `target`
pub fn translate(text: &str, target: &LanguageCode) -> Result<String, TranslationError> {
    if target.is_default() {
        Ok(text.to_string())
    } else {
        Err(TranslationError::Unsupported(target.to_string()))
    }
}
