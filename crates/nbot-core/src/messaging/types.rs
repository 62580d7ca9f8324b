/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Longest text accepted by a single send, in characters.
    pub max_message_len: usize,
}

impl MessagingCapabilities {
    pub fn fits(&self, text: &str) -> bool {
        text.chars().count() <= self.max_message_len
    }
}
