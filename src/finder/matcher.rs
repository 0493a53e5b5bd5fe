use crate::library::{FeedItem, ProcessedEpisode};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Word-overlap score above which two show names are taken as the same
const NAME_SIMILARITY_THRESHOLD: f64 = 0.8;

struct Patterns {
    season_episode: Regex,   // S01E01, s1e1, S01 E01
    season_x_episode: Regex, // 1x01
    non_word: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    season_episode: Regex::new(r"(?i)\bS(\d{1,2})\s?E(\d{1,3})")
        .expect("Invalid season_episode regex"),
    season_x_episode: Regex::new(r"(?i)\b(\d{1,2})x(\d{1,3})\b")
        .expect("Invalid season_x_episode regex"),
    non_word: Regex::new(r"[^\w\s]").expect("Invalid non_word regex"),
});

/// Decides whether a feed item is the episode being searched for
pub struct EpisodeMatcher;

impl EpisodeMatcher {
    /// Lowercase, `&` spelled out, punctuation dropped, whitespace collapsed
    #[must_use]
    pub fn simplify_name(name: &str) -> String {
        let lowered = name.to_lowercase().replace('\'', "").replace('&', " and ");
        PATTERNS
            .non_word
            .replace_all(&lowered, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Season and episode numbers from a release title
    #[must_use]
    pub fn parse_season_episode(title: &str) -> Option<(i32, i32)> {
        let caps = PATTERNS
            .season_episode
            .captures(title)
            .or_else(|| PATTERNS.season_x_episode.captures(title))?;
        let season = caps.get(1)?.as_str().parse().ok()?;
        let episode = caps.get(2)?.as_str().parse().ok()?;
        Some((season, episode))
    }

    /// Whether the title names the show
    #[must_use]
    pub fn name_matches(title: &str, show_name: &str) -> bool {
        let show = Self::simplify_name(show_name);
        if show.is_empty() {
            return false;
        }
        let title = Self::simplify_name(title);

        // whole-word containment
        if format!(" {title} ").contains(&format!(" {show} ")) {
            return true;
        }

        // otherwise compare against the part before the episode tag
        let prefix = Self::title_prefix(&title);
        Self::string_similarity(&prefix, &show) >= NAME_SIMILARITY_THRESHOLD
    }

    /// Show name and episode numbers both agree
    #[must_use]
    pub fn is_match(item: &FeedItem, episode: &ProcessedEpisode) -> bool {
        if Self::parse_season_episode(&item.title) != Some((episode.season(), episode.number())) {
            return false;
        }

        let show = &episode.show;
        std::iter::once(show.search_term())
            .chain(std::iter::once(show.display_name()))
            .chain(episode.series.aliases.iter().map(String::as_str))
            .any(|name| Self::name_matches(&item.title, name))
    }

    fn title_prefix(simplified_title: &str) -> String {
        let words: Vec<&str> = simplified_title.split_whitespace().collect();
        let end = words
            .iter()
            .position(|w| Self::parse_season_episode(w).is_some())
            .unwrap_or(words.len());
        words[..end].join(" ")
    }

    /// Jaccard word overlap with a bonus for containment
    fn string_similarity(a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let words_a: HashSet<&str> = a.split_whitespace().collect();
        let words_b: HashSet<&str> = b.split_whitespace().collect();

        let intersection = words_a.intersection(&words_b).count();
        let union = words_a.union(&words_b).count();
        if union == 0 {
            return 0.0;
        }

        let jaccard = intersection as f64 / union as f64;
        let contains_bonus = if a.contains(b) || b.contains(a) {
            0.2
        } else {
            0.0
        };

        (jaccard + contains_bonus).min(1.0)
    }
}
