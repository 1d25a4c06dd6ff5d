/// Response normalization
///
/// Turns raw model text into the shapes stored in the IPTC record.
/// Both functions are pure; the only fallible step is translation.

use super::translate::translate;
use crate::config::LanguageCode;
use crate::error::TranslationError;

/// Separator the keyword prompt asks the model to use
pub const KEYWORD_DELIMITER: char = ';';

/// Split a keyword response into trimmed, lowercase, unique keywords
///
/// Order of first occurrence is kept. No count is enforced: whatever the
/// model returned is used, even though the prompt asks for five.
pub fn normalize_keywords(
    raw: &str,
    language: &LanguageCode,
) -> Result<Vec<String>, TranslationError> {
    let mut keywords: Vec<String> = Vec::new();

    for piece in raw.split(KEYWORD_DELIMITER) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        let keyword = translate(piece, language)?.to_lowercase();
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }

    Ok(keywords)
}

/// Trim a caption response and translate it
pub fn normalize_caption(raw: &str, language: &LanguageCode) -> Result<String, TranslationError> {
    translate(raw.trim(), language)
}
