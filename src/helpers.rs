use crate::error::AppError;

/// Split `text` into parts of at most `max_len` characters without breaking words,
/// then number them `" (i/N)"`.
///
/// The budget applies to the text before the page suffix, so a rendered part may be
/// up to the suffix length longer than `max_len`. A single word longer than `max_len`
/// is hard-cut. Newlines are removed from each part.
pub(crate) fn split_message(text: &str, max_len: usize) -> Result<Vec<String>, AppError> {
    let parts = split_words(text, max_len)?;
    Ok(add_page_numbers(&parts))
}

/// The word-safe split without page numbers.
pub(crate) fn split_words(text: &str, max_len: usize) -> Result<Vec<String>, AppError> {
    if max_len == 0 {
        return Err(AppError::InvalidInput("max_len must be greater than zero".into()));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    loop {
        // Runs of separators never start a part.
        while chars.get(start) == Some(&' ') {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }
        if chars.len() - start <= max_len {
            push_part(&mut parts, &chars[start..]);
            break;
        }

        let boundary = start + max_len;
        let cut = if chars[boundary] == ' ' {
            boundary
        } else {
            // Nearest space inside the window; a space at `start` would give an empty part.
            (start + 1..boundary)
                .rev()
                .find(|&i| chars[i] == ' ')
                .unwrap_or(boundary)
        };

        let mut end = cut;
        while end > start && chars[end - 1] == ' ' {
            end -= 1;
        }
        push_part(&mut parts, &chars[start..end]);
        start = cut;
    }

    Ok(parts)
}

fn push_part(parts: &mut Vec<String>, chars: &[char]) {
    let part: String = chars.iter().filter(|c| !matches!(c, '\n' | '\r')).collect();
    if !part.is_empty() {
        parts.push(part);
    }
}

pub(crate) fn add_page_numbers(parts: &[String]) -> Vec<String> {
    let total = parts.len();
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| format!("{part} ({}/{total})", i + 1))
        .collect()
}

/// Shorten `s` to `max` characters for log previews.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_suffix(part: &str) -> &str {
        let idx = part.rfind(" (").expect("page suffix");
        &part[..idx]
    }

    #[test]
    fn test_empty_text_gives_no_parts() {
        assert!(split_message("", 130).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_part() {
        let parts = split_message("short", 130).unwrap();
        assert_eq!(parts, vec!["short (1/1)".to_string()]);
    }

    #[test]
    fn test_zero_max_len_rejected() {
        let err = split_message("anything", 0).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_space_free_text_hard_cut() {
        let text = "x".repeat(300);
        let parts = split_words(&text, 130).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].chars().count(), 130);
        assert_eq!(parts[1].chars().count(), 130);
        assert_eq!(parts[2].chars().count(), 40);

        let numbered = split_message(&text, 130).unwrap();
        assert!(numbered[0].ends_with(" (1/3)"));
        assert!(numbered[1].ends_with(" (2/3)"));
        assert!(numbered[2].ends_with(" (3/3)"));
        assert_eq!(strip_suffix(&numbered[0]), "x".repeat(130));
    }

    #[test]
    fn test_cuts_at_space_exactly_on_boundary() {
        let parts = split_words("abcde fghij", 5).unwrap();
        assert_eq!(parts, vec!["abcde", "fghij"]);
    }

    #[test]
    fn test_backs_up_to_previous_space() {
        let parts = split_words("the quick brown fox", 12).unwrap();
        assert_eq!(parts, vec!["the quick", "brown fox"]);
    }

    #[test]
    fn test_long_word_overflow_then_resumes_word_safe() {
        let parts = split_words("supercalifragilistic is long", 10).unwrap();
        assert_eq!(parts, vec!["supercalif", "ragilistic", "is long"]);
    }

    #[test]
    fn test_no_part_exceeds_budget_before_suffix() {
        let text = "There is an 85% chance of a snow day tomorrow. Heavy snow is expected \
                    overnight with 6 to 8 inches by morning and wind chills near zero. \
                    Buses may struggle on rural roads so keep your boots by the door.";
        for part in split_words(text, 40).unwrap() {
            assert!(part.chars().count() <= 40, "part too long: {part:?}");
        }
    }

    #[test]
    fn test_words_never_split() {
        let text = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima";
        let words: Vec<&str> = text.split(' ').collect();
        for part in split_words(text, 16).unwrap() {
            for w in part.split(' ') {
                assert!(words.contains(&w), "split word {w:?} in {part:?}");
            }
        }
    }

    #[test]
    fn test_reconstruction_reproduces_text() {
        let text = "Snow starts around 9 PM and continues until early morning.\n\
                    Expect slick roads and delays with a strong chance of closure.";
        let parts = split_message(text, 30).unwrap();
        let rebuilt: Vec<&str> = parts.iter().map(|p| strip_suffix(p)).collect();
        assert_eq!(rebuilt.join(" "), text.replace('\n', ""));
    }

    #[test]
    fn test_space_runs_do_not_split_words() {
        let parts = split_words("abcd  efgh ij", 4).unwrap();
        assert_eq!(parts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_double_space_after_sentence() {
        let text = "Snow is coming.  Stay home tomorrow.";
        let parts = split_words(text, 16).unwrap();
        assert_eq!(parts, vec!["Snow is coming.", "Stay home", "tomorrow."]);
        for part in &parts {
            assert!(!part.starts_with(' ') && !part.ends_with(' '), "padded part {part:?}");
        }
    }

    #[test]
    fn test_newlines_stripped() {
        let parts = split_words("line one\nline two", 130).unwrap();
        assert_eq!(parts, vec!["line oneline two"]);
    }

    #[test]
    fn test_newline_only_part_dropped() {
        let parts = split_message("abc \n\n\n def", 3).unwrap();
        assert_eq!(parts, vec!["abc (1/2)", "def (2/2)"]);
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "❄".repeat(5);
        let parts = split_words(&text, 2).unwrap();
        assert_eq!(parts, vec!["❄❄", "❄❄", "❄"]);
    }

    #[test]
    fn test_page_numbers() {
        let parts = vec!["a".to_string(), "b".to_string()];
        assert_eq!(add_page_numbers(&parts), vec!["a (1/2)", "b (2/2)"]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello...");
        assert_eq!(truncate("❄❄❄", 1), "❄...");
    }
}
