//! JSON salvage for oracle responses that carry surplus text.
//!
//! Oracles may wrap their JSON object in prose, markdown fences, or partial
//! retries. Salvage scans large responses for top-level balanced `{…}`
//! substrings, keeps those passing the caller's schema predicate, prefers
//! the candidate whose primary array is longest, and falls back to the
//! original input untouched when nothing qualifies.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use taskforge_types::{CoreError, CoreResult};

/// Inputs at or below this length are returned unchanged.
pub const SALVAGE_THRESHOLD: usize = 1024;

/// Extracts the best JSON candidate from a noisy oracle response.
///
/// Behavior, in order:
/// 1. input length ≤ [`SALVAGE_THRESHOLD`] → returned unchanged;
/// 2. every top-level balanced `{…}` substring is parsed;
/// 3. candidates failing `is_valid` are dropped;
/// 4. among survivors, the one with the longest non-empty array under
///    `primary_array` wins (first-seen wins ties);
/// 5. no survivors → the original input, unchanged.
pub fn salvage_json(
    input: &str,
    is_valid: impl Fn(&Value) -> bool,
    primary_array: &str,
) -> String {
    if input.len() <= SALVAGE_THRESHOLD {
        return input.to_string();
    }

    let mut best: Option<(usize, String)> = None;
    let mut candidates = 0usize;
    for span in balanced_object_spans(input) {
        let Ok(value) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        candidates += 1;
        if !is_valid(&value) {
            continue;
        }
        let array_len = value
            .get(primary_array)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        let better = match &best {
            None => true,
            Some((len, _)) => array_len > *len,
        };
        if better {
            best = Some((array_len, span.to_string()));
        }
    }

    match best {
        Some((len, winner)) => {
            debug!(candidates, primary_len = len, "salvaged oracle response");
            winner
        }
        None => input.to_string(),
    }
}

/// Salvages and decodes a raw oracle response into a typed result.
pub fn parse_with_salvage<T: DeserializeOwned>(raw: &str, primary_array: &str) -> CoreResult<T> {
    let salvaged = salvage_json(
        raw,
        |v| serde_json::from_value::<T>(v.clone()).is_ok(),
        primary_array,
    );
    serde_json::from_str(&salvaged).map_err(|e| CoreError::OracleMalformed(e.to_string()))
}

/// Byte spans of top-level balanced `{…}` substrings, string-aware.
fn balanced_object_spans(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&input[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_file_scores(v: &Value) -> bool {
        v.get("fileScores").is_some()
    }

    fn padded(payload: &str) -> String {
        // Push the input past the salvage threshold with harmless prose.
        format!("{}{}", "noise ".repeat(200), payload)
    }

    #[test]
    fn short_input_returned_unchanged() {
        let input = "not even json";
        assert_eq!(salvage_json(input, has_file_scores, "fileScores"), input);
    }

    #[test]
    fn picks_candidate_with_longest_primary_array() {
        let input = padded(
            r#"here you go {"fileScores": [1]} or maybe {"fileScores": [1, 2, 3]} done"#,
        );
        let out = salvage_json(&input, has_file_scores, "fileScores");
        assert_eq!(out, r#"{"fileScores": [1, 2, 3]}"#);
    }

    #[test]
    fn malformed_input_with_no_candidate_returned_unchanged() {
        let input = padded("{{{{ not balanced json here ");
        assert_eq!(salvage_json(&input, has_file_scores, "fileScores"), input);
    }

    #[test]
    fn schema_predicate_filters_candidates() {
        let input = padded(r#"{"other": 1} and {"fileScores": []} trailing"#);
        let out = salvage_json(&input, has_file_scores, "fileScores");
        assert_eq!(out, r#"{"fileScores": []}"#);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let input = padded(r#"{"fileScores": ["{oops}"], "note": "{"}"#);
        let out = salvage_json(&input, has_file_scores, "fileScores");
        assert_eq!(out, r#"{"fileScores": ["{oops}"], "note": "{"}"#);
    }

    #[test]
    fn typed_parse_salvages_noisy_payload() {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Scores {
            file_scores: Vec<u32>,
        }
        let input = padded(r#"Sure! {"fileScores": [7, 8]} Hope that helps."#);
        let scores: Scores = parse_with_salvage(&input, "fileScores").unwrap();
        assert_eq!(scores.file_scores, vec![7, 8]);
    }

    #[test]
    fn typed_parse_reports_malformed() {
        let err = parse_with_salvage::<Vec<u32>>("definitely not json", "fileScores").unwrap_err();
        assert_eq!(err.kind(), taskforge_types::ErrorKind::OracleMalformed);
    }
}
