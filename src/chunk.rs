//! Splitting fragment content into synthesis-sized chunks.
//!
//! Lengths are counted in characters. A chunk ends right after a
//! self-closing tag (`/>`) or a sentence end (`. `) whenever one exists in
//! the window, so markup is never cut in half. Without such a point the cut
//! falls after the last space outside a tag, then before a dangling tag,
//! and only as a last resort at the limit itself.

use memchr::{memchr, memrchr, memrchr2};

/// Split `content` into slices of at most `max_len` characters whose
/// concatenation is `content`.
pub fn split_content(content: &str, max_len: usize) -> Vec<&str> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut rest = content;

    while let Some((limit, _)) = rest.char_indices().nth(max_len) {
        let cut = find_cut(&rest.as_bytes()[..limit]).unwrap_or(limit);
        let (chunk, tail) = rest.split_at(cut);
        chunks.push(chunk);
        rest = tail;
    }

    chunks.push(rest);
    chunks
}

/// Best cut inside `window`, as a byte offset in `1..=window.len()`.
fn find_cut(window: &[u8]) -> Option<usize> {
    boundary_cut(window)
        .or_else(|| space_cut(window))
        .or_else(|| dangling_tag_cut(window))
}

fn boundary_cut(window: &[u8]) -> Option<usize> {
    let mut end = window.len();
    while let Some(pos) = memrchr2(b'>', b' ', &window[..end]) {
        let before = if window[pos] == b'>' { b'/' } else { b'.' };
        if pos > 0 && window[pos - 1] == before && !inside_tag(&window[..=pos]) {
            return Some(pos + 1);
        }
        end = pos;
    }
    None
}

fn space_cut(window: &[u8]) -> Option<usize> {
    let mut end = window.len();
    while let Some(pos) = memrchr(b' ', &window[..end]) {
        if !inside_tag(&window[..=pos]) {
            return Some(pos + 1);
        }
        end = pos;
    }
    None
}

fn dangling_tag_cut(window: &[u8]) -> Option<usize> {
    memrchr(b'<', window).filter(|&pos| pos > 0 && inside_tag(window))
}

/// Whether `head` ends inside an unterminated tag.
fn inside_tag(head: &[u8]) -> bool {
    match memrchr(b'<', head) {
        Some(open) => memchr(b'>', &head[open..]).is_none(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_content_is_one_chunk() {
        assert_eq!(split_content("Hello.", 4500), vec!["Hello."]);
        assert_eq!(split_content("", 10), vec![""]);
        assert_eq!(split_content("exactly10!", 10), vec!["exactly10!"]);
    }

    #[test]
    fn test_cut_after_sentence_end() {
        let content = format!("{}. {}", "a".repeat(4199), "b".repeat(799));
        assert_eq!(content.len(), 5000);

        let chunks = split_content(&content, 4500);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4201);
        assert!(chunks[0].ends_with(". "));
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_cut_after_self_closing_tag() {
        let content = r#"one two<break time="1s"/>three four"#;
        let chunks = split_content(content, 30);
        assert_eq!(chunks[0], r#"one two<break time="1s"/>"#);
        assert_eq!(chunks[1], "three four");
    }

    #[test]
    fn test_prefers_latest_boundary() {
        let chunks = split_content("A. B. C. D", 7);
        assert_eq!(chunks, vec!["A. B. ", "C. D"]);
    }

    #[test]
    fn test_falls_back_to_space() {
        let chunks = split_content("alpha beta gamma", 12);
        assert_eq!(chunks, vec!["alpha beta ", "gamma"]);
    }

    #[test]
    fn test_falls_back_before_dangling_tag() {
        let chunks = split_content(r#"word<break time="1s"/>"#, 10);
        assert_eq!(chunks[0], "word");
        assert!(chunks[1].starts_with('<'));
    }

    #[test]
    fn test_hard_cut_without_any_boundary() {
        let chunks = split_content("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let content = "привет. мир";
        assert_eq!(split_content(content, 11), vec![content]);
        assert_eq!(split_content(content, 10), vec!["привет. ", "мир"]);
    }

    #[test]
    fn test_zero_limit_still_progresses() {
        assert_eq!(split_content("ab", 0), vec!["a", "b"]);
    }

    fn content_strategy() -> impl Strategy<Value = String> {
        let token = prop_oneof![
            "[a-zа-я]{1,12}",
            Just(" ".to_string()),
            Just(". ".to_string()),
            Just(r#"<break time="500ms"/>"#.to_string()),
            Just(r#"<break strength="x-strong"/>"#.to_string()),
        ];
        prop::collection::vec(token, 0..200).prop_map(|tokens| tokens.concat())
    }

    proptest! {
        #[test]
        fn prop_chunks_concatenate_to_content(content in content_strategy(), max_len in 40usize..300) {
            let chunks = split_content(&content, max_len);
            prop_assert_eq!(chunks.concat(), content);
        }

        #[test]
        fn prop_chunks_respect_limit(content in content_strategy(), max_len in 40usize..300) {
            for chunk in split_content(&content, max_len) {
                prop_assert!(chunk.chars().count() <= max_len);
            }
        }

        #[test]
        fn prop_no_truncated_tag(content in content_strategy(), max_len in 40usize..300) {
            for chunk in split_content(&content, max_len) {
                prop_assert!(!inside_tag(chunk.as_bytes()), "truncated tag in {:?}", chunk);
                prop_assert!(!chunk.starts_with("break"));
            }
        }
    }
}
