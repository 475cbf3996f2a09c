//! Weighted string similarity on a 0–100 scale.
//!
//! Both strings are processed first (lowercased, every non-alphanumeric
//! character replaced by a space, trimmed). The score is the best of a plain
//! ratio and a set of token-aware variants, each discounted by how far it
//! strays from a straight comparison:
//!
//! - similar lengths: token-sort and token-set ratios, scaled by 0.95
//! - lengths differing by 1.5× or more: best-window partial ratio scaled by
//!   0.9 (0.6 from 8× on), plus partial token-sort and token-set variants
//!   scaled by a further 0.95
//!
//! Scoring is deterministic; ties in `extract` keep candidate order.

const UNBASE_SCALE: f64 = 0.95;
const PARTIAL_SCALE: f64 = 0.9;
const LONG_PARTIAL_SCALE: f64 = 0.6;

/// Lowercase, replace non-alphanumerics with spaces, trim.
pub fn process(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

/// `round(200 · LCS / (|a| + |b|))` over characters. Identical strings score
/// 100; an empty side scores 0.
pub fn ratio(a: &str, b: &str) -> u32 {
    if a == b {
        return 100;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    char_ratio(&a, &b)
}

fn char_ratio(a: &[char], b: &[char]) -> u32 {
    if a == b {
        return 100;
    }
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let common = lcs(a, b);
    (200.0 * common as f64 / (a.len() + b.len()) as f64).round() as u32
}

fn lcs(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Best `ratio` of the shorter string against every equal-length window of
/// the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    let mut best = 0;
    for window in longer.windows(shorter.len()) {
        let score = char_ratio(shorter, window);
        if score == 100 {
            return 100;
        }
        best = best.max(score);
    }
    best
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// `ratio` after sorting each side's tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> u32 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn token_set_with(a: &str, b: &str, scorer: fn(&str, &str) -> u32) -> u32 {
    let mut left: Vec<&str> = a.split_whitespace().collect();
    let mut right: Vec<&str> = b.split_whitespace().collect();
    left.sort_unstable();
    left.dedup();
    right.sort_unstable();
    right.dedup();

    let common: Vec<&str> = left.iter().copied().filter(|t| right.contains(t)).collect();
    let only_left: Vec<&str> = left.iter().copied().filter(|t| !common.contains(t)).collect();
    let only_right: Vec<&str> = right.iter().copied().filter(|t| !common.contains(t)).collect();

    let sect = common.join(" ");
    let combined_left = format!("{} {}", sect, only_left.join(" ")).trim().to_string();
    let combined_right = format!("{} {}", sect, only_right.join(" ")).trim().to_string();

    [
        scorer(&sect, &combined_left),
        scorer(&sect, &combined_right),
        scorer(&combined_left, &combined_right),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

/// Compare shared tokens against each side's shared-plus-own tokens.
pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    token_set_with(a, b, ratio)
}

/// The weighted similarity of two raw strings.
pub fn wratio(a: &str, b: &str) -> u32 {
    let p1 = process(a);
    let p2 = process(b);
    if p1.is_empty() || p2.is_empty() {
        return 0;
    }

    let base = ratio(&p1, &p2) as f64;
    let (l1, l2) = (p1.chars().count() as f64, p2.chars().count() as f64);
    let len_ratio = l1.max(l2) / l1.min(l2);

    let best = if len_ratio < 1.5 {
        let sort = token_sort_ratio(&p1, &p2) as f64 * UNBASE_SCALE;
        let set = token_set_ratio(&p1, &p2) as f64 * UNBASE_SCALE;
        base.max(sort).max(set)
    } else {
        let scale = if len_ratio >= 8.0 { LONG_PARTIAL_SCALE } else { PARTIAL_SCALE };
        let partial = partial_ratio(&p1, &p2) as f64 * scale;
        let sort = partial_ratio(&sorted_tokens(&p1), &sorted_tokens(&p2)) as f64 * UNBASE_SCALE * scale;
        let set = token_set_with(&p1, &p2, partial_ratio) as f64 * UNBASE_SCALE * scale;
        base.max(partial).max(sort).max(set)
    };
    best.round() as u32
}

/// Score every choice against `query` and keep the `limit` best, highest
/// first. Equal scores keep their input order.
pub fn extract<'a, I>(query: &str, choices: I, limit: usize) -> Vec<(&'a str, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(&'a str, u32)> = choices.into_iter().map(|c| (c, wratio(query, c))).collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(limit);
    scored
}

/// The single best choice; the first one wins a tie.
pub fn extract_one<'a, I>(query: &str, choices: I) -> Option<(&'a str, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, u32)> = None;
    for choice in choices {
        let score = wratio(query, choice);
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((choice, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_normalizes_case_and_punctuation() {
        assert_eq!(process("  Young's Modulus (GPa) "), "young s modulus  gpa");
        assert_eq!(process("--"), "");
    }

    #[test]
    fn ratio_counts_common_subsequence() {
        assert_eq!(ratio("copperr", "copper"), 92);
        assert_eq!(ratio("abc", "abc"), 100);
        assert_eq!(ratio("abc", ""), 0);
        assert_eq!(ratio("abc", "xyz"), 0);
    }

    #[test]
    fn partial_ratio_finds_the_best_window() {
        assert_eq!(partial_ratio("steel", "stainless steel"), 100);
        assert_eq!(partial_ratio("cu", "copper"), 50);
    }

    #[test]
    fn token_variants_ignore_word_order() {
        assert_eq!(token_sort_ratio("carbon steel", "steel carbon"), 100);
        assert_eq!(token_set_ratio("low alloy steel", "steel alloy"), 100);
    }

    #[test]
    fn weighted_scores() {
        assert_eq!(wratio("wood", "Wood"), 100);
        assert_eq!(wratio("Copperr", "Copper"), 92);
        assert_eq!(wratio("Cu", "Copper"), 45);
        assert_eq!(wratio("Aluminium", "Aluminum"), 94);
        assert_eq!(wratio("density", "Density"), 100);
        assert_eq!(wratio("", "Wood"), 0);
        assert_eq!(wratio("!!", "Wood"), 0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let first = wratio("melting point", "Melting/glass temperature");
        for _ in 0..5 {
            assert_eq!(wratio("melting point", "Melting/glass temperature"), first);
        }
    }

    #[test]
    fn extract_orders_by_score_and_keeps_ties_stable() {
        let choices = ["Iron", "Wood", "wood", "Copper"];
        let top = extract("wood", choices, 3);
        assert_eq!(top[0], ("Wood", 100));
        assert_eq!(top[1], ("wood", 100));
        assert_eq!(top.len(), 3);

        assert_eq!(extract_one("WOOD", choices), Some(("Wood", 100)));
        assert_eq!(extract_one("wood", std::iter::empty()), None);
    }
}
