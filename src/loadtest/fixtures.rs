//! Random board payloads for write requests.
//!
//! Every create request carries a fresh [`Fixture`]. Nothing here is
//! reproducible across runs; callers pass the generator in so tests can seed it.

use rand::prelude::*;
use serde::Serialize;

/// Title prefixes, one of which starts every generated title.
pub const TITLE_PREFIXES: [&str; 5] = [
    "PerfTest",
    "LoadTest",
    "K6Test",
    "Benchmark",
    "StressTest",
];

/// Words used to build board content. Each entry is a single token.
pub const CONTENT_WORDS: [&str; 15] = [
    "MySQL",
    "memory",
    "performance",
    "test",
    "K6",
    "load",
    "benchmark",
    "database",
    "optimization",
    "index",
    "query",
    "transaction",
    "connection-pool",
    "cache",
    "SpringBoot",
];

/// Prefix of every generated author name.
pub const AUTHOR_PREFIX: &str = "vuser";

/// Word count bounds for generated content, upper bound exclusive.
pub const MIN_WORDS: usize = 20;
pub const MAX_WORDS: usize = 100;

const SENTENCE_BREAK_PROBABILITY: f64 = 0.1;

/// `"<prefix> <unix-millis>-<n>"` with `n` in `[0, 10000)`.
pub fn generate_random_title<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = TITLE_PREFIXES[rng.random_range(0..TITLE_PREFIXES.len())];
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rng.random_range(0..10_000);
    format!("{prefix} {timestamp}-{suffix}")
}

/// Space-separated vocabulary words; roughly one in ten ends a sentence.
pub fn generate_random_content<R: Rng + ?Sized>(rng: &mut R) -> String {
    let word_count = rng.random_range(MIN_WORDS..MAX_WORDS);
    let mut words = Vec::with_capacity(word_count);
    for _ in 0..word_count {
        let word = CONTENT_WORDS[rng.random_range(0..CONTENT_WORDS.len())];
        if rng.random_bool(SENTENCE_BREAK_PROBABILITY) {
            words.push(format!("{word}."));
        } else {
            words.push(word.to_string());
        }
    }
    words.join(" ")
}

/// `"vuser<n>"` with `n` in `[0, 1000)`.
pub fn generate_random_author<R: Rng + ?Sized>(rng: &mut R) -> String {
    let n: u32 = rng.random_range(0..1000);
    format!("{AUTHOR_PREFIX}{n}")
}

/// JSON body of `POST /api/boards`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Fixture {
    pub title: String,
    pub content: String,
    pub author: String,
}

impl Fixture {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            title: generate_random_title(rng),
            content: generate_random_content(rng),
            author: generate_random_author(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_title_has_prefix_and_timestamp() {
        let mut rng = seeded();
        let before = chrono::Utc::now().timestamp_millis();
        let title = generate_random_title(&mut rng);
        let after = chrono::Utc::now().timestamp_millis();

        let (prefix, rest) = title.split_once(' ').unwrap();
        assert!(TITLE_PREFIXES.contains(&prefix), "{title}");

        let (ts, n) = rest.split_once('-').unwrap();
        let ts: i64 = ts.parse().unwrap();
        assert!(ts >= before && ts <= after);
        assert!(n.parse::<u32>().unwrap() < 10_000);
    }

    #[test]
    fn test_content_word_count_and_vocabulary() {
        let mut rng = seeded();
        for _ in 0..50 {
            let content = generate_random_content(&mut rng);
            let tokens: Vec<&str> = content.split(' ').collect();
            assert!((MIN_WORDS..MAX_WORDS).contains(&tokens.len()));
            for token in tokens {
                let word = token.strip_suffix('.').unwrap_or(token);
                assert!(CONTENT_WORDS.contains(&word), "unexpected token {token:?}");
            }
        }
    }

    #[test]
    fn test_author_format() {
        let mut rng = seeded();
        let author = generate_random_author(&mut rng);
        let n: u32 = author.strip_prefix(AUTHOR_PREFIX).unwrap().parse().unwrap();
        assert!(n < 1000);
    }

    #[test]
    fn test_fixture_serializes_to_create_body() {
        let mut rng = seeded();
        let fixture = Fixture::random(&mut rng);
        let json = serde_json::to_value(&fixture).unwrap();
        assert_eq!(json["title"], fixture.title.as_str());
        assert_eq!(json["content"], fixture.content.as_str());
        assert_eq!(json["author"], fixture.author.as_str());
        assert_eq!(json.as_object().unwrap().len(), 3);
    }
}
