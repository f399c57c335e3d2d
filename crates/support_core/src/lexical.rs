use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalMatch<'a> {
    pub index: usize,
    pub target: &'a str,
    pub rating: f32,
}

fn squash(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Sørensen–Dice coefficient over character bigrams, ignoring case and
/// whitespace. Returns a rating in `[0, 1]`.
pub fn compare_two_strings(a: &str, b: &str) -> f32 {
    let first = squash(a);
    let second = squash(b);

    if first == second {
        return 1.0;
    }
    if first.len() < 2 || second.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in first.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut intersection = 0usize;
    for pair in second.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2 * intersection) as f32 / (first.len() + second.len() - 2) as f32
}

/// Highest-rated candidate for `query`; the first candidate wins ties.
pub fn best_match<'a, S>(query: &str, candidates: &'a [S]) -> Option<LexicalMatch<'a>>
where
    S: AsRef<str>,
{
    let mut best: Option<LexicalMatch<'a>> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let target = candidate.as_ref();
        let rating = compare_two_strings(query, target);
        if best.map_or(true, |b| rating > b.rating) {
            best = Some(LexicalMatch {
                index,
                target,
                rating,
            });
        }
    }
    best
}
