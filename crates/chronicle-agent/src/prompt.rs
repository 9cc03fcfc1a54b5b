/// 3-tier system prompt for Anthropic prompt caching.
///
/// TIER 1 (static): module instructions + tool defs — identical across calls
/// for a given module.
///   → cache_control: {type: "ephemeral"} — high hit rate across messages.
/// TIER 2 (per-channel): anything that varies by channel but not by message.
///   → cache_control: {type: "ephemeral"}.
/// TIER 3 (volatile): anything that changes every call — placed LAST so it
///   doesn't break the cached prefix.
///   → NO cache.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    pub static_tier: String,
    pub user_tier: String,
    pub volatile_tier: String,
}

impl SystemPrompt {
    pub fn new(static_tier: impl Into<String>) -> Self {
        Self {
            static_tier: static_tier.into(),
            user_tier: String::new(),
            volatile_tier: String::new(),
        }
    }

    /// Flatten all tiers into a single string (for providers without caching).
    pub fn to_plain_text(&self) -> String {
        let mut out = self.static_tier.clone();
        if !self.user_tier.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.user_tier);
        }
        if !self.volatile_tier.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.volatile_tier);
        }
        out
    }

    /// Convert to Anthropic API format with cache breakpoints.
    pub fn to_anthropic_blocks(&self) -> Vec<serde_json::Value> {
        let mut blocks = Vec::with_capacity(3);

        blocks.push(serde_json::json!({
            "type": "text",
            "text": self.static_tier,
            "cache_control": { "type": "ephemeral" }
        }));

        if !self.user_tier.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.user_tier,
                "cache_control": { "type": "ephemeral" }
            }));
        }

        if !self.volatile_tier.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.volatile_tier,
            }));
        }

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_joins_non_empty_tiers() {
        let mut prompt = SystemPrompt::new("static");
        prompt.user_tier = "user".to_string();
        assert_eq!(prompt.to_plain_text(), "static\n\nuser");
    }

    #[test]
    fn anthropic_blocks_cache_only_static_and_user_tiers() {
        let mut prompt = SystemPrompt::new("static");
        prompt.user_tier = "user".to_string();
        prompt.volatile_tier = "volatile".to_string();
        let blocks = prompt.to_anthropic_blocks();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].get("cache_control").is_some());
        assert!(blocks[1].get("cache_control").is_some());
        assert!(blocks[2].get("cache_control").is_none());
    }
}
