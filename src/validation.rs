use crate::models::room::Category;

pub const ROOM_CODE_LENGTH: usize = 6;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_OPTION_TEXT_LENGTH: usize = 100;

/// Characters a room code may contain. `0`, `O`, `I` and `1` are left out
/// because they are easy to misread.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Outcome of a length check on free text. Callers persist `trimmed`, never
/// the raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextCheck<'a> {
    pub is_valid: bool,
    pub trimmed: &'a str,
}

pub fn validate_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

pub fn validate_name(name: &str) -> TextCheck<'_> {
    check_trimmed_length(name, MAX_NAME_LENGTH)
}

pub fn validate_option_text(text: &str) -> TextCheck<'_> {
    check_trimmed_length(text, MAX_OPTION_TEXT_LENGTH)
}

pub fn validate_category(value: &str) -> Option<Category> {
    value.parse().ok()
}

fn check_trimmed_length(value: &str, max: usize) -> TextCheck<'_> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();
    TextCheck {
        is_valid: (1..=max).contains(&length),
        trimmed,
    }
}
