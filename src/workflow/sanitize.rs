//! Free-text notes are stored as plain text: markup and script vectors are
//! stripped before anything is persisted.

use regex::Regex;
use std::sync::OnceLock;

const PAIRED_TAGS: [&str; 9] = [
    "script", "iframe", "object", "embed", "form", "textarea", "select", "button", "style",
];

fn patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        let mut list: Vec<Regex> = PAIRED_TAGS
            .iter()
            .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b.*?</{tag}\s*>")).unwrap())
            .collect();
        list.extend(
            [
                r"(?i)<(?:input|link|meta)\b[^>]*>",
                r"(?i)(?:javascript|vbscript|data):",
                r"(?i)on\w+\s*=",
                r"(?i)(?:expression|eval)\s*\(",
                r"<[^>]*>",
            ]
            .iter()
            .map(|p| Regex::new(p).unwrap()),
        );
        list
    })
}

pub fn sanitize_notes(input: &str) -> String {
    let mut text = input.to_string();
    for re in patterns() {
        text = re.replace_all(&text, "").into_owned();
    }
    text.trim().to_string()
}
