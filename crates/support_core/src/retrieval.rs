use crate::model::FaqEntry;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Ranks `entries` by cosine similarity to `query_embedding`, best first.
/// The sort is stable, so equal scores keep corpus order.
pub fn top_k<'a>(
    query_embedding: &[f32],
    entries: &'a [FaqEntry],
    k: usize,
) -> Vec<(&'a FaqEntry, f32)> {
    let mut scored: Vec<(&FaqEntry, f32)> = entries
        .iter()
        .map(|entry| (entry, cosine_similarity(query_embedding, &entry.embedding)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(k).collect()
}

pub fn top_match<'a>(
    query_embedding: &[f32],
    entries: &'a [FaqEntry],
) -> Option<(&'a FaqEntry, f32)> {
    top_k(query_embedding, entries, 1).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_entry(question: &str, emb: Vec<f32>) -> FaqEntry {
        FaqEntry {
            category: "General".to_string(),
            question: question.to_string(),
            answer: format!("answer-{question}"),
            embedding: emb,
        }
    }

    #[test]
    fn cosine_works_for_unit_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_vector_with_itself_is_one() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_exactly_zero() {
        let v = vec![0.3, -1.2, 4.5];
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn cosine_rejects_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn top_match_selects_best_entry() {
        let entries = vec![
            mk_entry("e1", vec![1.0, 0.0]),
            mk_entry("e2", vec![0.0, 1.0]),
        ];
        let (entry, score) = top_match(&[0.9, 0.1], &entries).expect("match");

        assert_eq!(entry.question, "e1");
        assert!(score > 0.9);
    }

    #[test]
    fn ties_keep_corpus_order() {
        let entries = vec![
            mk_entry("first", vec![1.0, 0.0]),
            mk_entry("second", vec![1.0, 0.0]),
        ];
        let ranked = top_k(&[1.0, 0.0], &entries, 2);

        assert_eq!(ranked[0].0.question, "first");
        assert_eq!(ranked[1].0.question, "second");
    }

    #[test]
    fn top_match_on_empty_corpus_is_none() {
        assert!(top_match(&[1.0], &[]).is_none());
    }
}
