use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use super::ArticleText;

const TITLE_WEIGHT: f64 = 3.0;
const SUMMARY_WEIGHT: f64 = 1.0;
const MIN_TOKEN_LEN: usize = 3;
const MAX_LABEL_TOKENS: usize = 4;
const MIN_LABEL_TOKENS: usize = 3;

// Common English function words plus news-domain filler that would
// otherwise dominate term frequency across almost every cluster.
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her",
        "was", "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new",
        "now", "old", "see", "two", "way", "who", "boy", "did", "its", "let", "put", "say",
        "she", "too", "use", "with", "that", "this", "from", "they", "have", "been", "will",
        "what", "when", "make", "like", "time", "just", "know", "take", "into", "year", "your",
        "good", "some", "could", "them", "than", "then", "look", "only", "come", "over", "think",
        "also", "back", "after", "work", "first", "well", "even", "want", "because", "these",
        "give", "most", "about", "before", "through", "between", "under", "while", "where",
        "during", "without", "within", "against", "toward", "towards", "among", "should",
        "would", "their", "there", "those", "being", "other", "which", "does", "doing", "each",
        "such", "same", "both", "here", "very", "more", "once", "again", "above", "below",
        "further", "once", "off", "down", "up", "upon", "per", "via", "amid", "amidst",
        "news", "report", "reports", "reported", "reporting", "said", "says", "saying",
        "today", "yesterday", "tomorrow", "week", "weeks", "month", "months", "years",
        "according", "officials", "official", "statement", "announced", "announcement",
        "according", "sources", "source", "told", "tells", "telling", "spokesperson",
        "press", "release", "update", "updates", "updated", "breaking", "latest", "exclusive",
        "analysis", "opinion", "editorial", "article", "articles", "story", "stories",
        "inc", "corp", "ltd", "llc", "co", "company", "companies", "group", "group",
        "percent", "million", "billion", "thousand", "hundred", "dollars", "amount",
        "including", "include", "includes", "included", "across", "several", "many",
        "much", "few", "less", "least", "lot", "lots", "part", "parts", "number",
        "people", "person", "members", "member", "public", "government", "country",
        "countries", "world", "national", "local", "state", "states", "city", "cities",
        "said", "say", "according", "news", "wrote", "writes", "writing", "calls",
        "called", "calling", "going", "went", "gone", "still", "never", "always", "often",
        "sometimes", "however", "therefore", "thus", "hence", "meanwhile", "furthermore",
        "nonetheless", "nevertheless", "moreover", "otherwise", "instead", "despite",
        "although", "though", "unless", "until", "since", "whether", "either", "neither",
        "nor", "whose", "whom", "itself", "himself", "herself", "themselves", "ourselves",
        "yourself", "yourselves", "myself", "been", "being",
    ]
    .into_iter()
    .collect()
});

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| w.len() >= MIN_TOKEN_LEN)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(w.as_str()))
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Weighted term-frequency label: title tokens score 3.0, summary tokens
/// score 1.0, then greedily picks the highest-scoring tokens that are not a
/// substring or superstring of an already-chosen token.
pub fn label_for(ids: &[i32], texts: &HashMap<i32, ArticleText>) -> String {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for id in ids {
        let Some(text) = texts.get(id) else { continue };
        for token in tokenize(&text.title) {
            *scores.entry(token).or_insert(0.0) += TITLE_WEIGHT;
        }
        if let Some(summary) = &text.summary {
            for token in tokenize(summary) {
                *scores.entry(token).or_insert(0.0) += SUMMARY_WEIGHT;
            }
        }
    }

    let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

    let mut chosen: Vec<String> = Vec::new();
    for (token, _) in ranked {
        if chosen.len() >= MAX_LABEL_TOKENS {
            break;
        }
        let related = chosen
            .iter()
            .any(|c| c.contains(token.as_str()) || token.contains(c.as_str()));
        if !related {
            chosen.push(token);
        }
    }

    if chosen.len() < MIN_LABEL_TOKENS && chosen.is_empty() {
        return "Uncategorized".to_string();
    }

    chosen
        .into_iter()
        .map(|w| capitalize(&w))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_uncategorized_when_all_stopwords() {
        let mut texts = HashMap::new();
        texts.insert(
            1,
            ArticleText {
                title: "The And For".to_string(),
                summary: None,
            },
        );
        assert_eq!(label_for(&[1], &texts), "Uncategorized");
    }

    #[test]
    fn shared_tokens_produce_expected_label() {
        let mut texts = HashMap::new();
        for (id, title) in [
            (1, "Climate policy shakes Europe"),
            (2, "Europe climate policy debate"),
            (3, "Policy makers discuss climate in Europe"),
        ] {
            texts.insert(
                id,
                ArticleText {
                    title: title.to_string(),
                    summary: None,
                },
            );
        }
        let label = label_for(&[1, 2, 3], &texts);
        assert!(label.contains("Climate"));
        assert!(label.contains("Policy"));
        assert!(label.contains("Europe"));
    }

    #[test]
    fn suppresses_substring_duplicates() {
        let mut texts = HashMap::new();
        texts.insert(
            1,
            ArticleText {
                title: "report reporting reporter coverage coverage coverage".to_string(),
                summary: None,
            },
        );
        let label = label_for(&[1], &texts);
        // "report"/"reporting" are stopwords; "reporter" is not, "coverage" should win.
        assert!(label.contains("Coverage"));
    }
}
