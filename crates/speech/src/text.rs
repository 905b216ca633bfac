//! Text cleanup before synthesis.

/// Pictographs, dingbats, variation selectors and private-use glyphs that
/// a synthesizer would either skip or read out by name.
fn is_unspeakable(c: char) -> bool {
    matches!(
        c as u32,
        0x200D
            | 0x20E3
            | 0x2300..=0x23FF
            | 0x2500..=0x27BF
            | 0x2B00..=0x2BFF
            | 0xE000..=0xF8FF
            | 0xFE00..=0xFE0F
            | 0x1F000..=0x1FAFF
            | 0xE0000..=0xE007F
            | 0xF0000..=0x10FFFF
    )
}

/// Strip emoji and symbols, collapse whitespace and repeated `.`/`?`/`!`,
/// and trim. An empty result means there is nothing to say.
pub fn clean_for_speech(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !is_unspeakable(*c)).collect();

    let mut out = String::with_capacity(stripped.len());
    for word in stripped.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for c in word.chars() {
            if matches!(c, '.' | '?' | '!') && out.ends_with(c) {
                continue;
            }
            out.push(c);
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_emoji_and_status_markers() {
        assert_eq!(clean_for_speech("✅ Done!!! 🎉"), "Done!");
        assert_eq!(clean_for_speech("💾 Note saved (id=3)."), "Note saved (id=3).");
        assert_eq!(clean_for_speech("⚠️ Careful"), "Careful");
    }

    #[test]
    fn collapses_whitespace_and_punctuation() {
        assert_eq!(clean_for_speech("  See   you\n\nsoon...  "), "See you soon.");
        assert_eq!(clean_for_speech("Really?? Yes!!"), "Really? Yes!");
    }

    #[test]
    fn keeps_ordinary_text() {
        let text = "The café opens at 9:30, doesn't it?";
        assert_eq!(clean_for_speech(text), text);
    }

    #[test]
    fn emoji_only_becomes_empty() {
        assert_eq!(clean_for_speech("🧠 🔍 🖼️"), "");
        assert_eq!(clean_for_speech("   "), "");
    }
}
