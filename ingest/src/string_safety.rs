/// Largest index `<= index` that lies on a UTF-8 character boundary of `value`.
pub fn floor_char_boundary(value: &str, index: usize) -> usize {
    if index >= value.len() {
        return value.len();
    }
    (0..=index)
        .rev()
        .find(|&i| value.is_char_boundary(i))
        .unwrap_or_default()
}

/// Smallest index `>= index` that lies on a UTF-8 character boundary of `value`.
pub fn ceil_char_boundary(value: &str, index: usize) -> usize {
    if index >= value.len() {
        return value.len();
    }
    (index..value.len())
        .find(|&i| value.is_char_boundary(i))
        .unwrap_or(value.len())
}

/// At most `max_len` bytes from the start of `value`, never splitting a character.
pub fn safe_truncate_str(value: &str, max_len: usize) -> &str {
    &value[..floor_char_boundary(value, max_len)]
}

/// At most `max_len` bytes from the end of `value`, never splitting a character.
pub fn safe_truncate_str_tail(value: &str, max_len: usize) -> &str {
    let start = value.len().saturating_sub(max_len);
    &value[ceil_char_boundary(value, start)..]
}

pub fn is_blank<T: AsRef<str>>(value: T) -> bool {
    value.as_ref().trim().is_empty()
}
