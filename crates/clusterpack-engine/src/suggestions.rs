//! Fuzzy matching for template errors
//!
//! Missing setters, map keys and functions are matched against what is
//! available using Levenshtein distance so typos come with a hint.

use crate::functions;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Functions handled by the interpreter rather than the helper registry
pub const PRIMITIVES: &[&str] = &["and", "or", "value", "render", "args", "nargs"];

/// Calculate Levenshtein distance between two strings
pub fn levenshtein(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Find closest matches from a list of candidates, best first
pub fn find_closest_matches<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_results: usize,
) -> Vec<&'a str> {
    let mut matches: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = levenshtein(input, candidate);
            (distance <= MAX_SUGGESTION_DISTANCE && distance > 0).then_some((distance, candidate))
        })
        .collect();

    matches.sort_by_key(|(distance, _)| *distance);
    matches.truncate(max_results);
    matches.into_iter().map(|(_, candidate)| candidate).collect()
}

fn did_you_mean(matches: &[&str]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let quoted: Vec<String> = matches.iter().map(|m| format!("`{}`", m)).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

/// Suggest a setter name for `value "..."`
pub fn suggest_setter<'a>(name: &str, available: impl IntoIterator<Item = &'a str>) -> Option<String> {
    did_you_mean(&find_closest_matches(name, available, 3))
}

/// Suggest a map key for a field lookup
pub fn suggest_key<'a>(key: &str, available: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let matches = find_closest_matches(key, available, 3);
    if key == "values" && matches.contains(&"Values") {
        return Some("Did you mean `Values`? Setter values live under `.Values`".to_string());
    }
    did_you_mean(&matches)
}

/// Suggest a function name
pub fn suggest_function(name: &str) -> Option<String> {
    let names = functions::names();
    let candidates = PRIMITIVES.iter().copied().chain(names.iter().copied());
    did_you_mean(&find_closest_matches(name, candidates, 3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein("value", "values"), 1);
        assert_eq!(levenshtein("sortAlpha", "sortAlpha"), 0);
    }

    #[test]
    fn test_find_closest_matches() {
        let matches = find_closest_matches("regoin", ["region", "cluster", "regions"], 3);
        assert_eq!(matches, vec!["region", "regions"]);
    }

    #[test]
    fn test_suggest_function() {
        assert_eq!(
            suggest_function("sortalpha").as_deref(),
            Some("Did you mean `sortAlpha`?")
        );
        assert!(suggest_function("nargz").unwrap().starts_with("Did you mean `nargs`"));
        assert!(suggest_function("completelyunrelated").is_none());
    }

    #[test]
    fn test_suggest_key_values_case() {
        let hint = suggest_key("values", ["Values"]).unwrap();
        assert!(hint.contains("`.Values`"));
    }
}
