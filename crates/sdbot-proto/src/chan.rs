//! Channel name helpers.

/// Extension trait for checking whether a string names a channel.
pub trait ChannelExt {
    /// Returns true if the string starts with a channel prefix (`#`, `&`, `+`, `!`).
    fn is_channel_name(&self) -> bool;
}

impl ChannelExt for str {
    fn is_channel_name(&self) -> bool {
        matches!(self.chars().next(), Some('#' | '&' | '+' | '!'))
    }
}

impl ChannelExt for String {
    fn is_channel_name(&self) -> bool {
        self.as_str().is_channel_name()
    }
}
