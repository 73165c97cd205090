/// Sequence codec for the textual cell encodings used by the prediction exports.
///
/// Inning-by-inning scores are kept as [`InningLine`] everywhere inside the
/// crate. Delimited text only exists at the edges: the export cells parsed by
/// the import pipeline and the SQLite columns they are persisted in.
///
/// Every decoder here is total. Malformed input degrades to zero-substituted
/// tokens, skipped segments or an empty result; nothing returns an error.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::teams::normalize;

/// Delimiter written by [`encode_sequence`].
pub const SEQUENCE_DELIMITER: char = ';';

/// `<TEAM>: <n>|<n>|...`
static INNING_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]{2,4})\s*:\s*([0-9|\s]+)\s*$").unwrap()
});

/// `<TEAM> <int> : <int> <TEAM>`
static TOTAL_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]{2,4})\s+([0-9]+)\s*:\s*([0-9]+)\s*([A-Za-z]{2,4})\s*$").unwrap()
});

/// Runs scored per inning by one team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InningLine(Vec<i32>);

impl InningLine {
    /// Decode a delimited cell, see [`decode_sequence`].
    pub fn from_text(text: &str) -> Self {
        InningLine(decode_sequence(text))
    }

    /// Encode as `;`-joined text for persistence.
    pub fn to_text(&self) -> String {
        encode_sequence(&self.0)
    }

    pub fn into_inner(self) -> Vec<i32> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i32>> for InningLine {
    fn from(runs: Vec<i32>) -> Self {
        InningLine(runs)
    }
}

/// Decode a `;`- or `|`-delimited list of numbers.
///
/// The delimiter is `;` if present anywhere in the text, otherwise `|`,
/// otherwise the whole text is a single token. Tokens are trimmed and blank
/// ones skipped. A token that is not an integer is read as a float and
/// truncated; if that fails too it decodes to `0` so positions are preserved.
pub fn decode_sequence(text: &str) -> Vec<i32> {
    if text.is_empty() {
        return Vec::new();
    }
    let delimiter = if text.contains(';') {
        Some(';')
    } else if text.contains('|') {
        Some('|')
    } else {
        None
    };
    match delimiter {
        Some(d) => decode_tokens(text.split(d)),
        None => decode_tokens(std::iter::once(text)),
    }
}

/// Join with `;`. `decode_sequence(&encode_sequence(xs)) == xs` for every `xs`.
pub fn encode_sequence(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&SEQUENCE_DELIMITER.to_string())
}

fn decode_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<i32> {
    tokens
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(decode_token)
        .collect()
}

fn decode_token(token: &str) -> i32 {
    if let Ok(v) = token.parse::<i32>() {
        return v;
    }
    match token.parse::<f64>() {
        // `as` saturates out-of-range values
        Ok(f) if f.is_finite() => f.trunc() as i32,
        _ => 0,
    }
}

/// Decode a per-team inning block such as `"SF: 0|1|2 || CIN: 1|0|1"`.
///
/// Segments are separated by `||`; each must look like `<2-4 letters>: <runs>`
/// with runs separated by `|`. Segments that don't match are dropped without
/// affecting their siblings. Team codes are normalized.
pub fn decode_inning_block(text: &str) -> BTreeMap<String, InningLine> {
    let mut out = BTreeMap::new();
    if text.trim().is_empty() {
        return out;
    }
    for segment in text.split("||") {
        let Some(caps) = INNING_SEGMENT.captures(segment) else {
            continue;
        };
        let runs: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
        out.insert(normalize(&caps[1]), InningLine(decode_tokens(runs.split('|'))));
    }
    out
}

/// Decode a final-score cell such as `"SF 2 : 3 CIN"` into `{SF: 2, CIN: 3}`.
///
/// Returns an empty map when the text doesn't match.
pub fn decode_total_pair(text: &str) -> BTreeMap<String, i32> {
    let mut out = BTreeMap::new();
    let Some(caps) = TOTAL_PAIR.captures(text.trim()) else {
        return out;
    };
    let (Ok(left_score), Ok(right_score)) = (caps[2].parse::<i32>(), caps[3].parse::<i32>()) else {
        return out;
    };
    out.insert(normalize(&caps[1]), left_score);
    out.insert(normalize(&caps[4]), right_score);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Delimited sequences ──────────────────────────────────────────────────

    #[test]
    fn unparseable_token_becomes_zero_in_place() {
        assert_eq!(decode_sequence("3;x;2"), vec![3, 0, 2]);
    }

    #[test]
    fn empty_text_is_empty_sequence() {
        assert!(decode_sequence("").is_empty());
    }

    #[test]
    fn pipe_delimiter_is_accepted() {
        assert_eq!(decode_sequence("1|2|3"), vec![1, 2, 3]);
    }

    #[test]
    fn semicolon_takes_precedence_over_pipe() {
        // "1|2" is a single token under `;` and is not a number
        assert_eq!(decode_sequence("1|2;3"), vec![0, 3]);
    }

    #[test]
    fn single_token_without_delimiter() {
        assert_eq!(decode_sequence("7"), vec![7]);
        assert_eq!(decode_sequence("abc"), vec![0]);
    }

    #[test]
    fn blank_tokens_are_skipped_and_others_trimmed() {
        assert_eq!(decode_sequence(" 1 ; ;2;; 0 "), vec![1, 2, 0]);
    }

    #[test]
    fn float_tokens_truncate() {
        assert_eq!(decode_sequence("1.9;2.0;-0.5"), vec![1, 2, 0]);
    }

    #[test]
    fn non_finite_tokens_become_zero() {
        assert_eq!(decode_sequence("nan;inf;4"), vec![0, 0, 4]);
    }

    #[test]
    fn encode_joins_with_semicolons() {
        assert_eq!(encode_sequence(&[0, 1, 0, 3]), "0;1;0;3");
        assert_eq!(encode_sequence(&[]), "");
    }

    #[test]
    fn decode_inverts_encode() {
        let cases: Vec<Vec<i32>> = vec![
            vec![],
            vec![0],
            vec![0, 0, 1, 0, 2, 0, 0, 0, 0],
            vec![12, 3, 0, 0, 5, 1, 0, 0, 0, 1, 0, 2],
        ];
        for xs in cases {
            assert_eq!(decode_sequence(&encode_sequence(&xs)), xs);
        }
    }

    #[test]
    fn inning_line_reencodes_with_semicolons() {
        let line = InningLine::from_text("0|1|0|2");
        assert_eq!(line, InningLine::from(vec![0, 1, 0, 2]));
        assert_eq!(line.to_text(), "0;1;0;2");
    }

    // ── Per-team inning blocks ───────────────────────────────────────────────

    #[test]
    fn inning_block_decodes_both_teams() {
        let block = decode_inning_block("SF: 0|1|2 || CIN: 1|0|1");
        assert_eq!(block.len(), 2);
        assert_eq!(block["SF"], InningLine::from(vec![0, 1, 2]));
        assert_eq!(block["CIN"], InningLine::from(vec![1, 0, 1]));
    }

    #[test]
    fn inning_block_drops_unmatched_segment_only() {
        let block = decode_inning_block("SF: 0|1|2 || not a team line || CIN: 1|0|1");
        assert_eq!(block.len(), 2);
        assert_eq!(block["CIN"], InningLine::from(vec![1, 0, 1]));

        let block = decode_inning_block("SF: 0|x|2 || CIN: 1|0|1");
        assert_eq!(block.len(), 1);
        assert!(block.contains_key("CIN"));
    }

    #[test]
    fn inning_block_normalizes_team_codes() {
        let block = decode_inning_block("ath: 0 | 0 | 1 || AZ: 2|0|0");
        assert_eq!(block["OAK"], InningLine::from(vec![0, 0, 1]));
        assert_eq!(block["ARI"], InningLine::from(vec![2, 0, 0]));
    }

    #[test]
    fn inning_block_empty_input() {
        assert!(decode_inning_block("").is_empty());
        assert!(decode_inning_block("   ").is_empty());
    }

    // ── Total pairs ──────────────────────────────────────────────────────────

    #[test]
    fn total_pair_decodes_both_scores() {
        let totals = decode_total_pair("SF 2 : 3 CIN");
        assert_eq!(totals.len(), 2);
        assert_eq!(totals["SF"], 2);
        assert_eq!(totals["CIN"], 3);
    }

    #[test]
    fn total_pair_tolerates_spacing_and_aliases() {
        let totals = decode_total_pair("  ATH 10:4 sea ");
        assert_eq!(totals["OAK"], 10);
        assert_eq!(totals["SEA"], 4);
    }

    #[test]
    fn total_pair_garbage_is_empty() {
        assert!(decode_total_pair("garbage").is_empty());
        assert!(decode_total_pair("").is_empty());
        assert!(decode_total_pair("SF 2 - 3 CIN").is_empty());
    }
}
