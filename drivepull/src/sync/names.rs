use rand::Rng;
use rand::distributions::Alphanumeric;

/// Numbered candidates tried before falling back to a random suffix.
pub const MAX_NUMBERED_ATTEMPTS: u32 = 10_000;

/// Makes a raw remote display name legal on filesystems with reserved-character
/// restrictions. Percent-encodes `% < > : " / \ | ? *`, then rewrites exactly
/// one trailing space or period (which also covers the `.` and `..` special
/// cases). Returns `None` for empty input; such entries must be skipped.
pub fn sanitize(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            ':' => out.push_str("%3A"),
            '"' => out.push_str("%22"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '|' => out.push_str("%7C"),
            '?' => out.push_str("%3F"),
            '*' => out.push_str("%2A"),
            other => out.push(other),
        }
    }

    if out.ends_with(' ') {
        out.truncate(out.len() - 1);
        out.push_str("%20");
    } else if out.ends_with('.') {
        out.truncate(out.len() - 1);
        out.push_str("%2E");
    }

    Some(out)
}

/// Inserts the disambiguation suffix ` (n)` before the file extension.
pub fn numbered(name: &str, n: u32) -> String {
    let (stem, ext) = split_extension(name);
    format!("{stem} ({n}){ext}")
}

/// Fallback once the numbered attempts are exhausted; a random suffix makes
/// termination all but certain.
pub fn randomized(name: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    let (stem, ext) = split_extension(name);
    format!("{stem} ({suffix}){ext}")
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        // A leading period is a hidden file, not an extension.
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}
