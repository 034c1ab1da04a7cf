//! Text layout for packet descriptions.

/// Column width of wrapped model replies
pub const WRAP_COLUMNS: usize = 100;

/// Re-flow `text` into lines of at most `columns` characters.
///
/// Splits on any whitespace, so existing line breaks are not kept. A single
/// word longer than `columns` gets a line of its own rather than being cut.
pub fn wrap_words(text: &str, columns: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let width = current.chars().count();
        if !current.is_empty() && width + 1 + word.chars().count() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}
