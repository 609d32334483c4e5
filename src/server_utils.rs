use crate::participants::MatchId;

pub const MAX_NAME_CHARS: usize = 24;
pub const MAX_MATCH_ID_CHARS: usize = 32;

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed
        .chars()
        .filter(|ch| !ch.is_control())
        .take(MAX_NAME_CHARS)
        .collect()
}

/// Lowercased, `[a-z0-9-]` only. `None` or a blank id falls back to `main`.
pub fn normalize_match_id(raw: Option<&str>) -> Option<MatchId> {
    let Some(value) = raw else {
        return Some(MatchId::new("main"));
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(MatchId::new("main"));
    }
    let normalized = trimmed.to_ascii_lowercase();
    if normalized.len() > MAX_MATCH_ID_CHARS
        || !normalized
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    {
        return None;
    }
    Some(MatchId::new(normalized))
}

pub fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_limit_parsing_is_lenient_for_invalid_values() {
        assert_eq!(parse_leaderboard_limit(Some("8")), Some(8));
        assert_eq!(parse_leaderboard_limit(Some("0")), Some(0));
        assert_eq!(parse_leaderboard_limit(Some("abc")), None);
        assert_eq!(parse_leaderboard_limit(Some("-1")), None);
        assert_eq!(parse_leaderboard_limit(None), None);
    }

    #[test]
    fn match_ids_are_normalized_or_rejected() {
        assert_eq!(normalize_match_id(None), Some(MatchId::new("main")));
        assert_eq!(normalize_match_id(Some("  ")), Some(MatchId::new("main")));
        assert_eq!(
            normalize_match_id(Some(" Friday-Night ")),
            Some(MatchId::new("friday-night"))
        );
        assert_eq!(normalize_match_id(Some("room a")), None);
        assert_eq!(normalize_match_id(Some(&"x".repeat(40))), None);
    }

    #[test]
    fn sanitize_name_applies_trim_empty_and_max_len() {
        assert_eq!(sanitize_name(""), "Player");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(" Alice "), "Alice");
        assert_eq!(sanitize_name("a\u{0007}b"), "ab");
        assert_eq!(sanitize_name(&"9".repeat(30)).len(), MAX_NAME_CHARS);
    }
}
