use std::borrow::Cow;

/// Returns an uppercase representation, avoiding allocation when unnecessary.
pub fn uppercase(input: &str) -> Cow<'_, str> {
    if input.chars().all(|ch| !ch.is_lowercase()) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.to_uppercase())
    }
}

/// Trims and collapses interior whitespace runs to a single space.
pub fn squish(input: &str) -> Cow<'_, str> {
    let trimmed = input.trim();
    let mut previous_space = false;
    let needs_work = trimmed.chars().any(|ch| {
        let collapse = ch.is_whitespace() && (previous_space || ch != ' ');
        previous_space = ch.is_whitespace();
        collapse
    });
    if !needs_work {
        return Cow::Borrowed(trimmed);
    }
    Cow::Owned(trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Title-cases each word while leaving punctuation in place, so
/// `PIZZA/ITALIAN` becomes `Pizza/Italian` and `CAFÉ` becomes `Café`.
pub fn title_case(input: &str) -> Cow<'_, str> {
    let mut output = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            if at_word_start {
                output.extend(ch.to_uppercase());
            } else {
                output.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            output.push(ch);
            at_word_start = true;
        }
    }
    if output == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(output)
    }
}

/// Keeps only ASCII digits.
pub fn digits_only(input: &str) -> Cow<'_, str> {
    if input.chars().all(|ch| ch.is_ascii_digit()) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.chars().filter(char::is_ascii_digit).collect())
    }
}

/// Full cleanup for free-text categorical fields: squish, uppercase, then
/// title-case. Empty input yields `None`.
pub fn canonical_label(input: &str) -> Option<String> {
    let squished = squish(input);
    if squished.is_empty() {
        return None;
    }
    let upper = uppercase(&squished);
    Some(title_case(&upper).into_owned())
}
