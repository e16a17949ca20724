/// Static table mapping Claude model names to the upstream's model
/// constants. Unknown models — including the literal value `"auto"` — fall
/// back to the Sonnet constant.
const MODEL_TABLE: &[(&str, &str)] = &[
    ("claude-sonnet-4-5", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("claude-opus-4-5", "CLAUDE_OPUS_4_5_20250929_V1_0"),
    ("claude-haiku-4-5", "CLAUDE_HAIKU_4_5_20250929_V1_0"),
];

pub const DEFAULT_MODEL_ID: &str = "CLAUDE_SONNET_4_5_20250929_V1_0";

pub fn map_model(claude_model: &str) -> &'static str {
    MODEL_TABLE
        .iter()
        .find(|(name, _)| *name == claude_model)
        .map(|(_, id)| *id)
        .unwrap_or(DEFAULT_MODEL_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_maps_to_its_constant() {
        assert_eq!(map_model("claude-opus-4-5"), "CLAUDE_OPUS_4_5_20250929_V1_0");
    }

    #[test]
    fn unknown_model_defaults_to_sonnet() {
        assert_eq!(map_model("auto"), DEFAULT_MODEL_ID);
        assert_eq!(map_model("gpt-4"), DEFAULT_MODEL_ID);
    }
}
