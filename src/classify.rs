// src/classify.rs

/// Coarse media category of a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Text,
    Binary,
}

pub trait ContentClassifier: Sync {
    /// Classify blob content. Implementations may look at a prefix only.
    fn classify(&self, content: &[u8]) -> ContentClass;
}

/// Same heuristic as git and libgit2: a NUL byte in the first 8000 bytes
/// means binary.
#[derive(Debug, Clone, Copy)]
pub struct NulSniffer {
    pub sniff_len: usize,
}

impl NulSniffer {
    pub const DEFAULT_SNIFF_LEN: usize = 8000;
}

impl Default for NulSniffer {
    fn default() -> Self {
        Self {
            sniff_len: Self::DEFAULT_SNIFF_LEN,
        }
    }
}

impl ContentClassifier for NulSniffer {
    fn classify(&self, content: &[u8]) -> ContentClass {
        let prefix = &content[..content.len().min(self.sniff_len)];
        if memchr::memchr(0, prefix).is_some() {
            ContentClass::Binary
        } else {
            ContentClass::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_binary() {
        let sniffer = NulSniffer::default();
        assert_eq!(sniffer.classify(b"fn main() {}\n"), ContentClass::Text);
        assert_eq!(sniffer.classify(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), ContentClass::Binary);
    }

    #[test]
    fn test_empty_is_text() {
        assert_eq!(NulSniffer::default().classify(b""), ContentClass::Text);
    }

    #[test]
    fn test_only_prefix_is_inspected() {
        let sniffer = NulSniffer { sniff_len: 4 };
        assert_eq!(sniffer.classify(b"abcd\0"), ContentClass::Text);
        assert_eq!(sniffer.classify(b"abc\0"), ContentClass::Binary);
    }
}
