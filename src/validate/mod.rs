//! Content validation between fetch and inference.
//!
//! Rejects pages that cannot support a verdict before any inference is spent
//! on them. Checks run in a fixed order and the first match wins:
//! empty, insufficient, anti-bot, paywall.

use serde::{Deserialize, Serialize};

/// Case-insensitive phrases that indicate a bot wall instead of content.
pub const ANTI_BOT_PHRASES: [&str; 6] = [
    "access denied",
    "please verify you are human",
    "enable javascript",
    "checking your browser",
    "captcha",
    "cloudflare",
];

/// Case-insensitive phrases that indicate a paywall.
pub const PAYWALL_PHRASES: [&str; 5] = [
    "subscribe to continue",
    "subscription required",
    "paywall",
    "premium content",
    "sign in to read",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentFailureKind {
    Empty,
    Insufficient,
    AntiBot,
    Paywall,
}

impl ContentFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFailureKind::Empty => "content_empty",
            ContentFailureKind::Insufficient => "content_insufficient",
            ContentFailureKind::AntiBot => "content_anti_bot",
            ContentFailureKind::Paywall => "content_paywall",
        }
    }

    pub const ALL: [ContentFailureKind; 4] = [
        ContentFailureKind::Empty,
        ContentFailureKind::Insufficient,
        ContentFailureKind::AntiBot,
        ContentFailureKind::Paywall,
    ];
}

impl std::fmt::Display for ContentFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Trimmed page text.
    Valid { content: String },
    Rejected {
        reason: ContentFailureKind,
        detail: String,
    },
}

/// Decides whether page text is blocked content. `None` means readable.
///
/// Length checks are not part of this; they always run first.
pub trait ContentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Option<ContentFailureKind>;
}

/// Phrase block-lists; anti-bot is checked before paywall.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseClassifier;

impl ContentClassifier for PhraseClassifier {
    fn classify(&self, text: &str) -> Option<ContentFailureKind> {
        let lower = text.to_lowercase();
        if ANTI_BOT_PHRASES.iter().any(|p| lower.contains(p)) {
            Some(ContentFailureKind::AntiBot)
        } else if PAYWALL_PHRASES.iter().any(|p| lower.contains(p)) {
            Some(ContentFailureKind::Paywall)
        } else {
            None
        }
    }
}

pub struct ContentValidator {
    min_chars: usize,
    classifier: Box<dyn ContentClassifier>,
}

impl ContentValidator {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            classifier: Box::new(PhraseClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ContentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        let content = raw.trim();
        let len = content.chars().count();

        if len == 0 {
            return ValidationOutcome::Rejected {
                reason: ContentFailureKind::Empty,
                detail: "Page returned empty content".to_string(),
            };
        }
        if len < self.min_chars {
            return ValidationOutcome::Rejected {
                reason: ContentFailureKind::Insufficient,
                detail: format!("Page content too short ({len} chars)"),
            };
        }

        match self.classifier.classify(content) {
            Some(reason @ ContentFailureKind::AntiBot) => ValidationOutcome::Rejected {
                reason,
                detail: "Anti-bot protection detected in page content".to_string(),
            },
            Some(reason @ ContentFailureKind::Paywall) => ValidationOutcome::Rejected {
                reason,
                detail: "Paywall detected - content not accessible".to_string(),
            },
            Some(reason) => ValidationOutcome::Rejected {
                reason,
                detail: format!("Content rejected ({reason})"),
            },
            None => ValidationOutcome::Valid {
                content: content.to_string(),
            },
        }
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler() -> String {
        "The committee announced the final tally on Tuesday evening. ".repeat(3)
    }

    fn reason(outcome: ValidationOutcome) -> Option<ContentFailureKind> {
        match outcome {
            ValidationOutcome::Valid { .. } => None,
            ValidationOutcome::Rejected { reason, .. } => Some(reason),
        }
    }

    #[test]
    fn test_empty_after_trim() {
        let v = ContentValidator::default();
        assert_eq!(reason(v.validate("")), Some(ContentFailureKind::Empty));
        assert_eq!(reason(v.validate("  \n\t ")), Some(ContentFailureKind::Empty));
    }

    #[test]
    fn test_short_page_is_insufficient_even_with_captcha() {
        let v = ContentValidator::default();
        let text = "captcha required, please verify you are human";
        assert_eq!(reason(v.validate(text)), Some(ContentFailureKind::Insufficient));
    }

    #[test]
    fn test_anti_bot_before_paywall() {
        let v = ContentValidator::default();
        let text = format!("{} Solve the CAPTCHA. This paywall blocks you.", filler());
        assert_eq!(reason(v.validate(&text)), Some(ContentFailureKind::AntiBot));
    }

    #[test]
    fn test_each_phrase_list() {
        let v = ContentValidator::default();
        for phrase in ANTI_BOT_PHRASES {
            let text = format!("{} {}", filler(), phrase.to_uppercase());
            assert_eq!(reason(v.validate(&text)), Some(ContentFailureKind::AntiBot), "{phrase}");
        }
        for phrase in PAYWALL_PHRASES {
            let text = format!("{} {}", filler(), phrase);
            assert_eq!(reason(v.validate(&text)), Some(ContentFailureKind::Paywall), "{phrase}");
        }
    }

    #[test]
    fn test_valid_content_is_trimmed() {
        let v = ContentValidator::default();
        let text = format!("  {}  ", filler());
        match v.validate(&text) {
            ValidationOutcome::Valid { content } => assert_eq!(content, filler().trim()),
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_classifier() {
        struct NeverBlocked;
        impl ContentClassifier for NeverBlocked {
            fn classify(&self, _: &str) -> Option<ContentFailureKind> {
                None
            }
        }

        let v = ContentValidator::new(10).with_classifier(Box::new(NeverBlocked));
        assert!(matches!(
            v.validate("captcha captcha captcha"),
            ValidationOutcome::Valid { .. }
        ));
    }
}
