//! SSML snippets shared by the fragment compiler and the synthesis driver.
//!
//! Every separator is a self-closing tag so the chunk splitter can always cut
//! right after it.

/// Timed silence, e.g. `<break time="3s"/>` or `<break time="1500ms"/>`.
///
/// Whole seconds (at one-decimal precision) are written in seconds, anything
/// else in milliseconds.
pub fn pause(seconds: f32) -> String {
    let seconds = seconds.max(0.0);
    let tenths = (seconds * 10.0).round() as u64;
    if tenths % 10 == 0 {
        format!(r#"<break time="{}s"/>"#, tenths / 10)
    } else {
        format!(r#"<break time="{}ms"/>"#, (seconds * 1000.0).round() as u64)
    }
}

/// Boundary between two paragraphs.
pub fn paragraph() -> &'static str {
    r#"<break strength="x-strong"/>"#
}

/// Wrap chunk content in the SSML root element.
pub fn speak(content: &str) -> String {
    format!("<speak>{content}</speak>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_whole_seconds() {
        assert_eq!(pause(3.0), r#"<break time="3s"/>"#);
        assert_eq!(pause(1.04), r#"<break time="1s"/>"#);
    }

    #[test]
    fn test_pause_fractional_seconds() {
        assert_eq!(pause(1.5), r#"<break time="1500ms"/>"#);
        assert_eq!(pause(0.25), r#"<break time="250ms"/>"#);
    }

    #[test]
    fn test_separators_are_self_closing() {
        assert!(paragraph().ends_with("/>"));
        assert_eq!(speak("a"), "<speak>a</speak>");
    }
}
