//! Name sanitizer for PlantUML WBS markup.

use std::sync::LazyLock;

use regex::Regex;

/// Placeholder for names that are empty after cleaning.
const UNNAMED: &str = "(unnamed)";

/// Creole markers that toggle formatting when doubled (`**bold**`, `--strike--`, ...).
const TOGGLES: [char; 5] = ['*', '/', '"', '-', '_'];

/// PlantUML escape character.
const ESCAPE: char = '~';

/// Make a platform name safe to place after a WBS marker.
///
/// Control characters (newlines included) become spaces so a name can never
/// start a new diagram line; whitespace is collapsed; doubled creole toggles
/// and `<` are escaped with `~`, and `~` itself becomes `~~`.
pub fn sanitize_name(raw: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let flattened: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = WS_RE.replace_all(flattened.trim(), " ");

    if collapsed.is_empty() {
        return UNNAMED.to_string();
    }
    escape_creole(&collapsed)
}

fn escape_creole(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == ESCAPE {
            out.push(ESCAPE);
            out.push(ESCAPE);
            i += 1;
        } else if c == '<' {
            out.push(ESCAPE);
            out.push(c);
            i += 1;
        } else if TOGGLES.contains(&c) && chars.get(i + 1) == Some(&c) {
            out.push(ESCAPE);
            out.push(c);
            out.push(ESCAPE);
            out.push(c);
            i += 2;
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}
