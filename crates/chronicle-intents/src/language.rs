//! Local, model-free language classification used to enforce the
//! reply-in-the-sender's-language policy without spending a model call on it.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Cyrillic,
    Arabic,
    Hebrew,
    Cjk,
    Other,
}

fn classify_char(c: char) -> Option<Script> {
    match c as u32 {
        0x0041..=0x024F => Some(Script::Latin),
        0x0400..=0x04FF => Some(Script::Cyrillic),
        0x0600..=0x06FF => Some(Script::Arabic),
        0x0590..=0x05FF => Some(Script::Hebrew),
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0xAC00..=0xD7A3 => Some(Script::Cjk),
        _ => None,
    }
}

fn dominant_script(text: &str) -> Script {
    let mut counts = [0u32; 6];
    for c in text.chars() {
        if let Some(script) = classify_char(c) {
            counts[script as usize] += 1;
        }
    }
    let (idx, &max) = counts.iter().enumerate().max_by_key(|(_, &n)| n).unwrap();
    if max == 0 {
        return Script::Other;
    }
    match idx {
        0 => Script::Latin,
        1 => Script::Cyrillic,
        2 => Script::Arabic,
        3 => Script::Hebrew,
        4 => Script::Cjk,
        _ => Script::Other,
    }
}

/// Small Latin-script keyword table. Not a language detector in any
/// rigorous sense — just enough signal to pick en/es/fr/de/pt apart when the
/// script alone (Latin) doesn't.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "you", "is", "are", "please", "remind", "meeting"]),
    ("es", &["el", "la", "que", "de", "para", "por favor", "reunion", "reunión"]),
    ("fr", &["le", "la", "de", "et", "vous", "s'il", "réunion", "reunion"]),
    ("de", &["der", "die", "und", "bitte", "sie", "treffen", "erinnerung"]),
    ("pt", &["o", "a", "que", "de", "para", "por favor", "reunião", "reuniao"]),
];

fn guess_latin_iso_code(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let mut best: Option<(&'static str, usize)> = None;
    for (code, keywords) in KEYWORDS {
        let hits = keywords
            .iter()
            .filter(|kw| words.contains(kw) || lowered.contains(**kw))
            .count();
        if hits > 0 && best.map(|(_, n)| hits > n).unwrap_or(true) {
            best = Some((code, hits));
        }
    }
    best.map(|(code, _)| code)
}

fn script_iso_code(script: Script) -> Option<&'static str> {
    match script {
        Script::Cyrillic => Some("ru"),
        Script::Arabic => Some("ar"),
        Script::Hebrew => Some("he"),
        Script::Cjk => Some("zh"),
        _ => None,
    }
}

/// Minimum character count below which a detection is marked unreliable —
/// short strings ("ok", "si") don't carry enough signal to trust.
const MIN_RELIABLE_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct LanguageDetection {
    pub script: Script,
    pub iso_code: Option<String>,
    pub reliable: bool,
    pub confidence: f64,
}

pub fn detect_language(text: &str) -> LanguageDetection {
    let script = dominant_script(text);
    let char_count = text.chars().filter(|c| !c.is_whitespace()).count();

    let (iso_code, confidence) = match script {
        Script::Latin => match guess_latin_iso_code(text) {
            Some(code) => (Some(code.to_string()), 0.6),
            None => (Some("en".to_string()), 0.3),
        },
        other => (script_iso_code(other).map(String::from), 0.9),
    };

    LanguageDetection {
        script,
        iso_code,
        reliable: char_count >= MIN_RELIABLE_LEN && confidence >= 0.5,
        confidence,
    }
}

/// Fields whose language disagrees with `target`, using the same detector
/// recursively on each field value.
pub fn mismatched_fields(fields: &[(&str, String)], target: &LanguageDetection) -> Vec<String> {
    if !target.reliable {
        return Vec::new();
    }
    fields
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .filter_map(|(name, value)| {
            let detected = detect_language(value);
            if detected.reliable && detected.iso_code != target.iso_code {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

pub fn corrective_instruction(target: &LanguageDetection, mismatched: &[String]) -> String {
    let lang = target.iso_code.as_deref().unwrap_or("the sender's language");
    format!(
        "Your previous tool call wrote {} in a different language than the sender's message. \
         Rewrite those fields in {lang} and call the action tool again.",
        mismatched.join(", "),
    )
}

/// Counters for the retry-once-on-mismatch loop, logged at `info` so
/// language-policy drift shows up in ordinary logs rather than needing a
/// dedicated dashboard.
#[derive(Default)]
pub struct LanguagePolicyCounters {
    retries_fired: AtomicU64,
    retries_still_mismatched: AtomicU64,
}

impl LanguagePolicyCounters {
    pub fn record_retry_fired(&self, module: &str) {
        let n = self.retries_fired.fetch_add(1, Ordering::Relaxed) + 1;
        info!(module, total_retries = n, "language-policy retry fired");
    }

    pub fn record_retry_still_mismatched(&self, module: &str) {
        let n = self.retries_still_mismatched.fetch_add(1, Ordering::Relaxed) + 1;
        info!(module, total_still_mismatched = n, "language-policy retry did not resolve mismatch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unreliable() {
        let d = detect_language("ok");
        assert!(!d.reliable);
    }

    #[test]
    fn detects_cyrillic_script() {
        let d = detect_language("Напомни мне о встрече завтра утром");
        assert_eq!(d.script, Script::Cyrillic);
        assert_eq!(d.iso_code.as_deref(), Some("ru"));
        assert!(d.reliable);
    }

    #[test]
    fn detects_english_keywords_in_latin_script() {
        let d = detect_language("Please remind me about the meeting tomorrow");
        assert_eq!(d.script, Script::Latin);
        assert_eq!(d.iso_code.as_deref(), Some("en"));
        assert!(d.reliable);
    }

    #[test]
    fn flags_disagreeing_field() {
        let target = detect_language("Please remind me about the meeting tomorrow");
        let fields = vec![("title".to_string(), "Recordatorio de reunión".to_string())];
        let fields: Vec<(&str, String)> = fields.iter().map(|(n, v)| (n.as_str(), v.clone())).collect();
        let mismatched = mismatched_fields(&fields, &target);
        assert_eq!(mismatched, vec!["title".to_string()]);
    }
}
