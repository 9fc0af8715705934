//! Character encoding detection for archive tool output
//!
//! Old archives store member names in whatever codepage the packer used, and
//! the tool prints them back byte for byte.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Hint for encoding detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingHint {
    Japanese,
    ChineseSimplified,
    ChineseTraditional,
    Korean,
    Cyrillic,
    None,
}

impl EncodingHint {
    /// Derive the hint from a POSIX locale name such as `ja_JP.UTF-8`
    pub fn from_locale(lang: &str) -> Self {
        let lang = lang.to_lowercase();
        if lang.starts_with("ja") {
            EncodingHint::Japanese
        } else if lang.starts_with("zh_cn") || lang.starts_with("zh-cn") {
            EncodingHint::ChineseSimplified
        } else if lang.starts_with("zh_tw") || lang.starts_with("zh-tw") {
            EncodingHint::ChineseTraditional
        } else if lang.starts_with("ko") {
            EncodingHint::Korean
        } else if lang.starts_with("ru") || lang.starts_with("uk") {
            EncodingHint::Cyrillic
        } else {
            EncodingHint::None
        }
    }

    /// Hint for the current process locale
    pub fn from_env() -> Self {
        std::env::var("LC_ALL")
            .or_else(|_| std::env::var("LANG"))
            .map(|lang| Self::from_locale(&lang))
            .unwrap_or(EncodingHint::None)
    }

    fn tld(self) -> Option<&'static [u8]> {
        match self {
            EncodingHint::Japanese => Some(b"jp"),
            EncodingHint::ChineseSimplified => Some(b"cn"),
            EncodingHint::ChineseTraditional => Some(b"tw"),
            EncodingHint::Korean => Some(b"kr"),
            EncodingHint::Cyrillic => Some(b"ru"),
            EncodingHint::None => None,
        }
    }

    fn fallback(self) -> Option<&'static Encoding> {
        match self {
            EncodingHint::Japanese => Some(encoding_rs::SHIFT_JIS),
            EncodingHint::ChineseSimplified => Some(encoding_rs::GBK),
            EncodingHint::ChineseTraditional => Some(encoding_rs::BIG5),
            EncodingHint::Korean => Some(encoding_rs::EUC_KR),
            EncodingHint::Cyrillic => Some(encoding_rs::WINDOWS_1251),
            EncodingHint::None => None,
        }
    }
}

/// Detect the most likely encoding of a byte sequence
pub fn detect_encoding(bytes: &[u8], hint: EncodingHint) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return encoding_rs::UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let detected = detector.guess(hint.tld(), true);

    // chardetng falls back to windows-1252 when it has nothing better
    match hint.fallback() {
        Some(preferred) if detected == encoding_rs::WINDOWS_1252 => preferred,
        _ => detected,
    }
}

/// Decode a raw listing into text; never fails
pub fn decode_listing(bytes: &[u8], hint: EncodingHint) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let encoding = detect_encoding(bytes, hint);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!("Listing decoded as {} with replacements", encoding.name());
    }

    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(decode_listing("naïve.txt".as_bytes(), EncodingHint::None), "naïve.txt");
    }

    #[test]
    fn test_shift_jis_name() {
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("日本語のファイル.txt");
        let decoded = decode_listing(&bytes, EncodingHint::Japanese);
        assert_eq!(decoded, "日本語のファイル.txt");
    }

    #[test]
    fn test_locale_hint() {
        assert_eq!(EncodingHint::from_locale("ja_JP.UTF-8"), EncodingHint::Japanese);
        assert_eq!(EncodingHint::from_locale("zh_TW.Big5"), EncodingHint::ChineseTraditional);
        assert_eq!(EncodingHint::from_locale("C"), EncodingHint::None);
    }

    #[test]
    fn test_invalid_bytes_do_not_fail() {
        let text = decode_listing(&[0x66, 0x6f, 0xff, 0xfe, 0x6f], EncodingHint::None);
        assert!(text.starts_with("fo"));
    }
}
