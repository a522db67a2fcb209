//! Tag format predicate.

/// Fixed-length tags made of a fixed prefix and a numeric suffix, such as
/// `H012345678`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFormat {
    length: usize,
    prefix: String,
}

impl TagFormat {
    #[must_use]
    pub fn new(length: usize, prefix: impl Into<String>) -> Self {
        Self {
            length,
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true when `tag` has the configured length and prefix and the
    /// remainder is ASCII digits.
    #[must_use]
    pub fn matches(&self, tag: &str) -> bool {
        tag.len() == self.length
            && tag
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|suffix| suffix.bytes().all(|byte| byte.is_ascii_digit()))
    }
}

impl Default for TagFormat {
    fn default() -> Self {
        Self::new(
            crate::defaults::DEFAULT_TAG_LENGTH,
            crate::defaults::DEFAULT_TAG_PREFIX,
        )
    }
}
