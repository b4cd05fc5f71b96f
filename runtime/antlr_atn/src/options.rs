//! Deserialization configuration.

/// Switches consumed by [`AtnDeserializer`](crate::AtnDeserializer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeserializationOptions {
    /// Run structural verification after decoding (and again after bypass
    /// synthesis).
    pub verify_atn: bool,
    /// Synthesize a bypass path per parser rule so a whole rule can be
    /// matched as a single token. Ignored for lexer ATNs.
    pub generate_rule_bypass_transitions: bool,
}

impl DeserializationOptions {
    #[must_use]
    pub fn with_verify_atn(mut self, verify: bool) -> Self {
        self.verify_atn = verify;
        self
    }

    #[must_use]
    pub fn with_rule_bypass_transitions(mut self, generate: bool) -> Self {
        self.generate_rule_bypass_transitions = generate;
        self
    }
}

impl Default for DeserializationOptions {
    fn default() -> Self {
        DeserializationOptions {
            verify_atn: true,
            generate_rule_bypass_transitions: false,
        }
    }
}
