//! Dotted class-name pattern matching.
//!
//! A single-segment pattern matches when any segment of the name starts with
//! it. A multi-segment pattern is aligned with the end of the name and each
//! of its segments must prefix the corresponding name segment. Both forms
//! ignore case.

pub fn matches_class_name(name: &str, pattern: &str) -> bool {
    if pattern.contains('.') {
        return matches_trailing_segments(name, pattern);
    }
    name.split('.')
        .any(|segment| starts_with_ignore_case(segment, pattern))
}

fn matches_trailing_segments(name: &str, pattern: &str) -> bool {
    let name_segments: Vec<&str> = name.split('.').collect();
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let Some(skip) = name_segments.len().checked_sub(pattern_segments.len()) else {
        return false;
    };
    name_segments[skip..]
        .iter()
        .zip(&pattern_segments)
        .all(|(segment, prefix)| starts_with_ignore_case(segment, prefix))
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    let mut text = text.chars().flat_map(char::to_lowercase);
    prefix
        .chars()
        .flat_map(char::to_lowercase)
        .all(|p| text.next() == Some(p))
}
