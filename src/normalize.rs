//! Fingerprint normalization and language detection.
//! Semantically identical requests must map to the same cache key: trim,
//! collapse internal whitespace runs, and case-fold Latin-script text only.
//! Script-sensitive text (Devanagari, CJK, ...) is compared byte-for-byte
//! after the whitespace pass.

use whatlang::Script;

/// Normalize text for cache-key derivation.
pub fn normalize_for_key(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match whatlang::detect_script(&collapsed) {
        Some(Script::Latin) => collapsed.to_lowercase(),
        _ => collapsed,
    }
}

/// Detects the dominant language of `text` using whatlang.
/// Returns an ISO 639-1 code or None if detection is unreliable.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    Some(lang_to_code(info.lang()))
}

fn lang_to_code(lang: whatlang::Lang) -> String {
    use whatlang::Lang::*;
    match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tam => "ta",
        Tel => "te",
        Ben => "bn",
        Mar => "mr",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        _ => "other",
    }
    .to_string()
}
