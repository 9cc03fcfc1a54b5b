//! Optional keyword prefilter. Purely local and cheap, so it can run ahead
//! of a model call to skip modules that obviously don't apply. It's a
//! decorator over `IntentModule`, not a change to the processor loop, so
//! adopting it is opt-in per deployment.

use async_trait::async_trait;
use chronicle_core::{IntentModule, ModuleInput, ModuleOutput};

const EVENT_KEYWORDS: &[&str] = &[
    "meeting", "event", "schedule", "appointment", "call", "reunión", "reunion", "rendez-vous",
    "termin", "reunião",
];

const REMINDER_KEYWORDS: &[&str] = &[
    "remind", "reminder", "recordatorio", "rappel", "erinnerung", "lembrete", "don't forget",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentTag {
    Event,
    Reminder,
    Both,
    None,
}

impl IntentTag {
    /// Whether a module of the given kind should be allowed to run.
    pub fn allows(&self, module_kind: &str) -> bool {
        match self {
            IntentTag::Both => true,
            IntentTag::Event => module_kind == "event",
            IntentTag::Reminder => module_kind == "reminder",
            IntentTag::None => false,
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Keyword-based routing over the message text and, if present, a subject
/// line. Case-insensitive, no stemming — a deliberately coarse prefilter.
pub fn route(text: &str, subject: Option<&str>) -> IntentTag {
    let combined = match subject {
        Some(s) => format!("{s} {text}").to_lowercase(),
        None => text.to_lowercase(),
    };

    let is_event = contains_any(&combined, EVENT_KEYWORDS);
    let is_reminder = contains_any(&combined, REMINDER_KEYWORDS);

    match (is_event, is_reminder) {
        (true, true) => IntentTag::Both,
        (true, false) => IntentTag::Event,
        (false, true) => IntentTag::Reminder,
        (false, false) => IntentTag::Both,
    }
}

/// Wraps an [`IntentModule`] so it only runs when `route` allows its kind,
/// otherwise short-circuiting to a `"none"` output without a model call.
pub struct RoutedModule<M: IntentModule> {
    inner: M,
}

impl<M: IntentModule> RoutedModule<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: IntentModule + Send + Sync> IntentModule for RoutedModule<M> {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn run(&self, input: ModuleInput) -> Result<ModuleOutput, String> {
        let tag = route(&input.current.text, None);
        if !tag.allows(self.inner.kind()) {
            return Ok(ModuleOutput {
                action: "none".to_string(),
                payload: serde_json::json!({}),
                reasoning: "filtered out by keyword router".to_string(),
            });
        }
        self.inner.run(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_text_defaults_to_both() {
        assert_eq!(route("let's catch up sometime", None), IntentTag::Both);
    }

    #[test]
    fn event_keyword_routes_to_event_only() {
        assert_eq!(route("can we schedule a meeting for friday", None), IntentTag::Event);
    }

    #[test]
    fn reminder_keyword_routes_to_reminder_only() {
        assert_eq!(route("remind me to call mom", None), IntentTag::Reminder);
    }

    #[test]
    fn both_keywords_route_to_both() {
        assert_eq!(route("remind me about the meeting", None), IntentTag::Both);
    }
}
