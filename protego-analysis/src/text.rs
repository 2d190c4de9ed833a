//! Text extraction and tokenization shared by the strategies

use once_cell::sync::Lazy;
use protego_common::models::ScrapedRecord;
use serde_json::Value;
use std::collections::HashSet;

/// Common English words that carry no signal on their own
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // articles, pronouns
        "a", "an", "the", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
        "them", "my", "your", "his", "its", "our", "their", "mine", "yours", "hers", "ours",
        "theirs",
        // prepositions
        "in", "on", "at", "by", "for", "with", "from", "to", "of", "about", "into", "onto",
        "through", "during", "before", "after", "above", "below", "up", "down", "out", "off",
        "over", "under", "again", "further", "then", "once",
        // conjunctions
        "and", "or", "but", "if", "because", "as", "until", "while", "whereas", "since",
        // auxiliaries
        "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "having", "do",
        "does", "did", "doing", "will", "would", "should", "could", "may", "might", "can",
        "cannot", "must", "shall",
        // determiners, adverbs
        "this", "that", "these", "those", "all", "each", "every", "both", "few", "more", "most",
        "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too",
        "very", "just", "now", "when", "where", "why", "how", "what", "who", "which", "whose",
        "whom", "one", "two", "three", "first", "second", "third",
    ]
    .into_iter()
    .collect()
});

/// Every string value in `value`, depth first, in document order
pub fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}

/// The text a record is analyzed over: its title followed by every string
/// in its payload, space separated
pub fn record_text(record: &ScrapedRecord) -> String {
    let mut parts = vec![record.title.as_str()];
    collect_strings(&record.payload, &mut parts);
    parts.join(" ")
}

/// Lower-cased alphabetic runs; digits and punctuation separate words
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}
