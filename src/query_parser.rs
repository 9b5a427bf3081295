use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical genre vocabulary, matching the genre names in the database.
pub const KNOWN_GENRES: [&str; 20] = [
    "Action", "Adventure", "Animation", "Comedy", "Crime",
    "Documentary", "Drama", "Family", "Fantasy", "Foreign",
    "History", "Horror", "Music", "Mystery", "Romance",
    "Science Fiction", "TV Movie", "Thriller", "War", "Western",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Lookup,
    Recommend,
    Compare,
    TopRated,
    CastCrew,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Lookup => "lookup",
            Intent::Recommend => "recommend",
            Intent::Compare => "compare",
            Intent::TopRated => "top_rated",
            Intent::CastCrew => "cast_crew",
            Intent::General => "general",
        }
    }
}

/// Structured result of parsing one user message. Built fresh per request,
/// consumed by the retrieval layer, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedQuery {
    pub intent: Intent,
    pub titles: Vec<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub person: Option<String>,
    pub sort_by: Option<String>,
    pub limit: usize,
    #[serde(skip_serializing)]
    pub raw_message: String,
}

impl ParsedQuery {
    fn new(raw_message: &str) -> Self {
        Self {
            intent: Intent::General,
            titles: Vec::new(),
            genre: None,
            year: None,
            year_from: None,
            year_to: None,
            person: None,
            sort_by: None,
            limit: 10,
            raw_message: raw_message.to_string(),
        }
    }
}

/// Rule-based intent classifier and parameter extractor.
///
/// All patterns are compiled once at construction; `parse` is a pure,
/// synchronous function with no I/O and no failure modes. Ambiguous
/// phrasing is resolved by rule order (most specific first), not by
/// confidence scoring.
pub struct QueryParser {
    quoted_title: Regex,
    year_exact: Regex,
    year_range: Regex,
    top_n: Regex,
    genre_pattern: Regex,
    lookup_patterns: Vec<Regex>,
    recommend_patterns: Vec<Regex>,
    compare_patterns: Vec<Regex>,
    top_rated_patterns: Vec<Regex>,
    cast_crew_patterns: Vec<Regex>,
    title_about: Regex,
    directed_person: Regex,
    who_directed: Regex,
    and_splitter: Regex,
    movie_film_word: Regex,
    movie_film_phrase: Regex,
}

impl QueryParser {
    pub fn new() -> Result<Self> {
        // Longest genre names first so "Science Fiction" wins over any
        // shorter name that could collide as a substring.
        let mut genres: Vec<&str> = KNOWN_GENRES.to_vec();
        genres.sort_by_key(|g| std::cmp::Reverse(g.len()));
        let genre_alternation = genres
            .iter()
            .map(|g| regex::escape(g))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            quoted_title: Regex::new(r#"["\u{201C}\u{201D}]([^"\u{201C}\u{201D}]+)["\u{201C}\u{201D}]"#)?,
            year_exact: Regex::new(r"\b(19[5-9]\d|20[0-3]\d)\b")?,
            year_range: Regex::new(
                r"(?i)\b(?:from|between)\s+(19[5-9]\d|20[0-3]\d)\s*(?:to|and|-)\s*(19[5-9]\d|20[0-3]\d)\b",
            )?,
            top_n: Regex::new(r"(?i)\btop\s+(\d{1,3})\b")?,
            genre_pattern: Regex::new(&format!("(?i){genre_alternation}"))?,
            lookup_patterns: vec![
                Regex::new(r"(?i)\b(?:tell\s+me\s+about|what\s+is|info(?:rmation)?\s+(?:about|on)|plot\s+of|overview\s+of|describe)\b")?,
                Regex::new(r"(?i)\bwhat(?:'s|\s+is)\s+the\s+(?:movie|film|plot|story)\b")?,
            ],
            recommend_patterns: vec![
                Regex::new(r"(?i)\b(?:recommend|suggest|give\s+me|show\s+me|find\s+me|any\s+good|looking\s+for)\b")?,
                Regex::new(r"(?i)\bmovies?\s+like\b")?,
                Regex::new(r"(?i)\bsimilar\s+to\b")?,
            ],
            compare_patterns: vec![
                Regex::new(r"(?i)\b(?:compare|versus|vs\.?|difference\s+between|better)\b")?,
            ],
            top_rated_patterns: vec![
                Regex::new(r"(?i)\b(?:best|top|highest[\s-]rated|most\s+popular|greatest|all[\s-]time)\b")?,
            ],
            cast_crew_patterns: vec![
                Regex::new(r"(?i)\bwho\s+(?:directed|starred|acted|is\s+the\s+director|is\s+in|are\s+the\s+(?:actors?|cast))\b")?,
                Regex::new(r"(?i)\b(?:directed\s+by|starring|movies?\s+(?:with|by|starring|featuring))\b")?,
                Regex::new(r"(?i)\b(?:cast|director|actors?|actress(?:es)?)\s+(?:of|in|for)\b")?,
            ],
            title_about: Regex::new(
                r"(?i)(?:(?:tell\s+me\s+)?about|what(?:'s|\s+is)\s+(?:the\s+)?(?:movie\s+)?|info\s+(?:on|about)|plot\s+of|overview\s+of|describe)\s+(.+?)(?:\?|$)",
            )?,
            directed_person: Regex::new(
                r"(?i)(?:directed|starring|(?:movies?\s+)?(?:with|by|featuring))\s+(.+?)(?:\?|$)",
            )?,
            who_directed: Regex::new(r"(?i)who\s+directed\s+(.+?)(?:\?|$)")?,
            and_splitter: Regex::new(r"(?i)\band\b")?,
            movie_film_word: Regex::new(r"(?i)\b(?:the\s+)?(?:movie|film)\b")?,
            movie_film_phrase: Regex::new(r"(?i)\b(?:the\s+)?(?:movie|film)\s*")?,
        })
    }

    /// Parse a user message into structured intent + parameters.
    /// Pure function: no LLM call, no I/O, cannot fail.
    pub fn parse(&self, message: &str) -> ParsedQuery {
        let mut result = ParsedQuery::new(message);
        let text = message.trim();

        // Side extraction is intent-independent: a recommend query can
        // still carry a year filter.
        result.titles = self.extract_titles(text);
        result.genre = self.extract_genre(text);

        if let Some(caps) = self.year_range.captures(text) {
            result.year_from = caps.get(1).and_then(|m| m.as_str().parse().ok());
            result.year_to = caps.get(2).and_then(|m| m.as_str().parse().ok());
        } else if let Some(caps) = self.year_exact.captures(text) {
            result.year = caps.get(1).and_then(|m| m.as_str().parse().ok());
        }

        if let Some(caps) = self.top_n.captures(text) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) {
                result.limit = n.min(50);
            }
        }

        // Intent classification (order matters: most specific first)

        if match_any(&self.compare_patterns, text) && result.titles.len() >= 2 {
            result.intent = Intent::Compare;
            return result;
        }

        if match_any(&self.compare_patterns, text) && text.to_lowercase().contains(" and ") {
            let parts: Vec<&str> = self.and_splitter.split(text).collect();
            if parts.len() >= 2 {
                result.intent = Intent::Compare;
                if result.titles.is_empty() {
                    result.titles = parts[parts.len() - 2..]
                        .iter()
                        .map(|p| trim_punct(p).to_string())
                        .collect();
                }
                return result;
            }
        }

        if match_any(&self.cast_crew_patterns, text) {
            result.intent = Intent::CastCrew;
            result.person = self.extract_person(text);
            if result.person.is_none() && result.titles.is_empty() {
                // "tell me about the cast of X" still yields a title
                if let Some(title) = self.extract_title_from_about(text) {
                    result.titles = vec![title];
                }
            }
            return result;
        }

        if match_any(&self.lookup_patterns, text) {
            result.intent = Intent::Lookup;
            if result.titles.is_empty() {
                if let Some(title) = self.extract_title_from_about(text) {
                    result.titles = vec![title];
                }
            }
            return result;
        }

        if match_any(&self.top_rated_patterns, text) {
            result.intent = Intent::TopRated;
            result.sort_by = Some("rating".to_string());
            return result;
        }

        if match_any(&self.recommend_patterns, text) {
            result.intent = Intent::Recommend;
            return result;
        }

        // Fallback: if there's a quoted title, treat it as a lookup
        if !result.titles.is_empty() {
            result.intent = Intent::Lookup;
            return result;
        }

        result.intent = Intent::General;
        result
    }

    /// Extract movie titles from quoted strings, in order of appearance.
    fn extract_titles(&self, text: &str) -> Vec<String> {
        self.quoted_title
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    fn extract_genre(&self, text: &str) -> Option<String> {
        let text_lower = text.to_lowercase();
        // "sci-fi" is not a substring of the canonical name, so it has to
        // be special-cased ahead of the alternation.
        if text_lower.contains("sci-fi") || text_lower.contains("scifi") {
            return Some("Science Fiction".to_string());
        }
        let matched = self.genre_pattern.find(text)?.as_str();
        KNOWN_GENRES
            .iter()
            .find(|g| g.eq_ignore_ascii_case(matched))
            .map(|g| g.to_string())
    }

    fn extract_person(&self, text: &str) -> Option<String> {
        for pat in [&self.directed_person, &self.who_directed] {
            if let Some(caps) = pat.captures(text) {
                let name = caps.get(1).map(|m| m.as_str())?;
                let name = trim_punct(name);
                let name = self.movie_film_word.replace_all(name, "");
                let name = name.trim();
                if name.len() > 2 {
                    return Some(name.to_string());
                }
            }
        }
        None
    }

    fn extract_title_from_about(&self, text: &str) -> Option<String> {
        let caps = self.title_about.captures(text)?;
        let title = trim_punct(caps.get(1)?.as_str());
        let title = self.movie_film_phrase.replace_all(title, "");
        let title = title.trim();
        if title.len() > 1 {
            Some(title.to_string())
        } else {
            None
        }
    }
}

fn match_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

fn trim_punct(s: &str) -> &str {
    s.trim().trim_matches(|c| matches!(c, '?' | '.' | '!'))
}

/// Prompt for the optional LLM classification fallback. Not part of the
/// deterministic parse path; see `OllamaService::classify_intent`.
pub const LLM_CLASSIFY_PROMPT: &str = r#"You are a query classifier for a movie database assistant.
Classify the user message into ONE intent and extract parameters.

Intents: lookup, recommend, compare, top_rated, cast_crew, general

Return ONLY valid JSON (no markdown):
{"intent": "...", "titles": [...], "genre": "...", "year": ..., "person": "..."}

Omit fields that are null.

User message: {message}"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(message: &str) -> ParsedQuery {
        QueryParser::new().unwrap().parse(message)
    }

    #[test]
    fn test_tell_me_about() {
        let r = parse("Tell me about Inception");
        assert_eq!(r.intent, Intent::Lookup);
        assert_eq!(r.titles, vec!["Inception"]);
    }

    #[test]
    fn test_quoted_title_lookup() {
        let r = parse(r#"What is the movie "The Matrix"?"#);
        assert_eq!(r.intent, Intent::Lookup);
        assert!(r.titles.contains(&"The Matrix".to_string()));
    }

    #[test]
    fn test_plot_of() {
        let r = parse("What is the plot of Interstellar?");
        assert_eq!(r.intent, Intent::Lookup);
    }

    #[test]
    fn test_describe() {
        let r = parse("Describe the movie Gladiator");
        assert_eq!(r.intent, Intent::Lookup);
        assert_eq!(r.titles, vec!["Gladiator"]);
    }

    #[test]
    fn test_recommend_genre() {
        let r = parse("Recommend action movies");
        assert_eq!(r.intent, Intent::Recommend);
        assert_eq!(r.genre.as_deref(), Some("Action"));
    }

    #[test]
    fn test_suggest_year() {
        let r = parse("Suggest comedy movies from 2020");
        assert_eq!(r.intent, Intent::Recommend);
        assert_eq!(r.genre.as_deref(), Some("Comedy"));
        assert_eq!(r.year, Some(2020));
    }

    #[test]
    fn test_looking_for_scifi_alias() {
        let r = parse("I'm looking for sci-fi movies");
        assert_eq!(r.intent, Intent::Recommend);
        assert_eq!(r.genre.as_deref(), Some("Science Fiction"));
    }

    #[test]
    fn test_movies_like() {
        let r = parse(r#"Movies like "Inception""#);
        assert_eq!(r.intent, Intent::Recommend);
        assert!(r.titles.contains(&"Inception".to_string()));
    }

    #[test]
    fn test_show_me() {
        let r = parse("Show me some thriller movies");
        assert_eq!(r.intent, Intent::Recommend);
        assert_eq!(r.genre.as_deref(), Some("Thriller"));
    }

    #[test]
    fn test_compare_two_quoted() {
        let r = parse(r#"Compare "The Godfather" and "Goodfellas""#);
        assert_eq!(r.intent, Intent::Compare);
        assert_eq!(r.titles.len(), 2);
        assert!(r.titles.contains(&"The Godfather".to_string()));
        assert!(r.titles.contains(&"Goodfellas".to_string()));
    }

    #[test]
    fn test_vs() {
        let r = parse(r#""Alien" vs "Aliens""#);
        assert_eq!(r.intent, Intent::Compare);
        assert_eq!(r.titles.len(), 2);
    }

    #[test]
    fn test_compare_unquoted_and_join() {
        let r = parse("Which is better, Heat and Collateral?");
        assert_eq!(r.intent, Intent::Compare);
        assert_eq!(r.titles.len(), 2);
        assert_eq!(r.titles[1], "Collateral");
    }

    #[test]
    fn test_best_of_year() {
        let r = parse("Best movies of 2015");
        assert_eq!(r.intent, Intent::TopRated);
        assert_eq!(r.year, Some(2015));
        assert_eq!(r.sort_by.as_deref(), Some("rating"));
    }

    #[test]
    fn test_highest_rated_genre() {
        let r = parse("Highest rated horror movies");
        assert_eq!(r.intent, Intent::TopRated);
        assert_eq!(r.genre.as_deref(), Some("Horror"));
    }

    #[test]
    fn test_top_n() {
        let r = parse("Top 5 comedy movies");
        assert_eq!(r.intent, Intent::TopRated);
        assert_eq!(r.genre.as_deref(), Some("Comedy"));
        assert_eq!(r.limit, 5);
    }

    #[test]
    fn test_top_n_capped() {
        let r = parse("top 500 comedies");
        assert_eq!(r.limit, 50);
    }

    #[test]
    fn test_greatest_all_time() {
        let r = parse("Greatest movies of all time");
        assert_eq!(r.intent, Intent::TopRated);
    }

    #[test]
    fn test_who_directed() {
        let r = parse("Who directed Inception?");
        assert_eq!(r.intent, Intent::CastCrew);
        assert_eq!(r.person.as_deref(), Some("Inception"));
    }

    #[test]
    fn test_movies_with_person() {
        let r = parse("Movies with Tom Hanks");
        assert_eq!(r.intent, Intent::CastCrew);
        assert_eq!(r.person.as_deref(), Some("Tom Hanks"));
    }

    #[test]
    fn test_cast_of_quoted() {
        let r = parse(r#"Cast of "Pulp Fiction""#);
        assert_eq!(r.intent, Intent::CastCrew);
        assert!(r.titles.contains(&"Pulp Fiction".to_string()));
    }

    #[test]
    fn test_directed_by() {
        let r = parse("Movies directed by Christopher Nolan");
        assert_eq!(r.intent, Intent::CastCrew);
        assert!(r.person.unwrap().contains("Christopher Nolan"));
    }

    #[test]
    fn test_year_extraction() {
        let r = parse("Best action movies from 2019");
        assert_eq!(r.year, Some(2019));
    }

    #[test]
    fn test_year_range_precedence() {
        let r = parse("movies from 1995 to 2005");
        assert_eq!(r.year_from, Some(1995));
        assert_eq!(r.year_to, Some(2005));
        assert_eq!(r.year, None);
    }

    #[test]
    fn test_year_outside_window_ignored() {
        let r = parse("movies from 1947");
        assert_eq!(r.year, None);
        assert_eq!(r.year_from, None);
    }

    #[test]
    fn test_genre_scifi_no_hyphen() {
        let r = parse("Recommend scifi movies");
        assert_eq!(r.genre.as_deref(), Some("Science Fiction"));
    }

    #[test]
    fn test_genre_case_insensitive() {
        let r = parse("Best COMEDY movies");
        assert_eq!(r.genre.as_deref(), Some("Comedy"));
    }

    #[test]
    fn test_duplicate_titles_preserved() {
        let r = parse(r#""A" and "A""#);
        assert_eq!(r.titles, vec!["A", "A"]);
    }

    #[test]
    fn test_curly_quotes() {
        let r = parse("Tell me about \u{201C}Arrival\u{201D}");
        assert_eq!(r.titles, vec!["Arrival"]);
    }

    #[test]
    fn test_generic_question_falls_to_general() {
        let r = parse("What are some fun things to watch on a rainy day?");
        assert_eq!(r.intent, Intent::General);
    }

    #[test]
    fn test_hello_is_general() {
        let r = parse("hello");
        assert_eq!(r.intent, Intent::General);
        assert!(r.titles.is_empty());
        assert_eq!(r.genre, None);
        assert_eq!(r.year, None);
        assert_eq!(r.person, None);
        assert_eq!(r.sort_by, None);
        assert_eq!(r.limit, 10);
    }

    #[test]
    fn test_empty_input() {
        let r = parse("");
        assert_eq!(r.intent, Intent::General);
        assert!(r.titles.is_empty());
    }

    #[test]
    fn test_quoted_title_only_falls_to_lookup() {
        let r = parse(r#""Blade Runner""#);
        assert_eq!(r.intent, Intent::Lookup);
        assert_eq!(r.titles, vec!["Blade Runner"]);
    }

    #[test]
    fn test_determinism() {
        let parser = QueryParser::new().unwrap();
        let a = parser.parse("Top 10 sci-fi movies from 1980 to 1999");
        let b = parser.parse("Top 10 sci-fi movies from 1980 to 1999");
        assert_eq!(a.intent, b.intent);
        assert_eq!(a.titles, b.titles);
        assert_eq!(a.genre, b.genre);
        assert_eq!(a.year_from, b.year_from);
        assert_eq!(a.year_to, b.year_to);
        assert_eq!(a.limit, b.limit);
    }

    #[test]
    fn test_serialization_omits_raw_message() {
        let r = parse("Best comedy movies");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["intent"], "top_rated");
        assert_eq!(json["genre"], "Comedy");
        assert!(json.get("raw_message").is_none());
    }
}
