//! Event-name exclusion.

/// Check whether `event_name` contains any of the `exclusions` substrings.
pub fn is_excluded<S: AsRef<str>>(event_name: &str, exclusions: &[S]) -> bool {
    exclusions
        .iter()
        .any(|substring| event_name.contains(substring.as_ref()))
}
