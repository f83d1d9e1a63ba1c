pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn fold(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn contains_phrase(haystack: &str, term: &str) -> bool {
    let needle = tokens(term);
    if needle.is_empty() {
        return false;
    }
    let hay = tokens(haystack);
    hay.windows(needle.len()).any(|window| window == needle.as_slice())
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
