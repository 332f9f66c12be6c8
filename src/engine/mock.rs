//! Phrase-table mock engine for development and tests.
//! Exact phrase matches translate at 0.95 confidence; unknown text falls
//! back to a prefixed passthrough at 0.75. Multi-word inputs get mock
//! alternatives. Latency is simulated and scales with input length.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Engine, EngineOutput};
use crate::error::EngineError;

const EXACT_MATCH_CONFIDENCE: f32 = 0.95;
const FALLBACK_CONFIDENCE: f32 = 0.75;

pub struct MockEngine {
    base_delay: Duration,
    phrases: HashMap<(&'static str, &'static str), HashMap<&'static str, &'static str>>,
    calls: AtomicU64,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

impl MockEngine {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            phrases: phrase_tables(),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of completed translate calls (for tests).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fallback_translation(&self, text: &str, target_lang: &str) -> String {
        match target_lang {
            "hi" => format!("अनुवादित: {text}"),
            "ta" => format!("மொழிபெயர்க்கப்பட்டது: {text}"),
            "te" => format!("అనువదించబడింది: {text}"),
            "bn" => format!("অনুবাদিত: {text}"),
            "mr" => format!("भाषांतरित: {text}"),
            "en" => format!("Translated: {text}"),
            other => format!("[{other}] {text}"),
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        // Simulated inference time: base + 1ms per 10 chars.
        let delay = self.base_delay + Duration::from_millis(text.len() as u64 / 10);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        }

        let (translated, confidence) = match self
            .phrases
            .get(&(source_lang, target_lang))
            .and_then(|table| table.get(text))
        {
            Some(hit) => (hit.to_string(), EXACT_MATCH_CONFIDENCE),
            None => (self.fallback_translation(text, target_lang), FALLBACK_CONFIDENCE),
        };

        let alternatives = if text.split_whitespace().count() > 1 {
            vec![
                format!("Alt 1: {translated}"),
                format!("Alt 2: {translated}"),
            ]
        } else {
            Vec::new()
        };

        self.calls.fetch_add(1, Ordering::Relaxed);

        Ok(EngineOutput {
            translated_text: translated,
            confidence,
            alternatives,
        })
    }
}

fn phrase_tables() -> HashMap<(&'static str, &'static str), HashMap<&'static str, &'static str>> {
    let mut tables = HashMap::new();

    tables.insert(
        ("en", "hi"),
        HashMap::from([
            ("Hello", "नमस्ते"),
            ("Hello world", "नमस्ते संसार"),
            ("How are you?", "आप कैसे हैं?"),
            ("Good morning", "सुप्रभात"),
            ("Thank you", "धन्यवाद"),
            ("Welcome", "स्वागत है"),
            ("Goodbye", "अलविदा"),
            ("Yes", "हाँ"),
            ("No", "नहीं"),
        ]),
    );
    tables.insert(
        ("en", "ta"),
        HashMap::from([
            ("Hello", "வணக்கம்"),
            ("Hello world", "வணக்கம் உலகம்"),
            ("Thank you", "நன்றி"),
            ("Good morning", "காலை வணக்கம்"),
            ("Yes", "ஆம்"),
            ("No", "இல்லை"),
        ]),
    );
    tables.insert(
        ("en", "te"),
        HashMap::from([
            ("Hello", "నమస్కారం"),
            ("Hello world", "హలో ప్రపంచం"),
            ("Thank you", "ధన్యవాదాలు"),
            ("Yes", "అవును"),
            ("No", "లేదు"),
        ]),
    );
    tables.insert(
        ("en", "bn"),
        HashMap::from([
            ("Hello", "হ্যালো"),
            ("Hello world", "হ্যালো বিশ্ব"),
            ("Thank you", "ধন্যবাদ"),
            ("Yes", "হ্যাঁ"),
            ("No", "না"),
        ]),
    );
    tables.insert(
        ("en", "mr"),
        HashMap::from([
            ("Hello", "नमस्कार"),
            ("Hello world", "हॅलो जग"),
            ("Thank you", "धन्यवाद"),
            ("Yes", "होय"),
            ("No", "नाही"),
        ]),
    );

    tables
}
