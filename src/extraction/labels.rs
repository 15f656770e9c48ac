/// Canonical form of an action label: lowercase, trimmed, inner whitespace
/// and underscores collapsed to a single `-`. `Add Food`, `add_food` and
/// `add-food` all become `add-food`.
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Labels the classifier uses to say it saw motion but no action.
pub fn is_no_action_label(label: &str) -> bool {
    matches!(label, "(none)" | "none" | "no-action")
}
