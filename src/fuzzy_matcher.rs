use lazy_static::lazy_static;
use regex::Regex;
use strsim::jaro_winkler;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Minimum score for a one-word team name found inside free text.
const SINGLE_WORD_THRESHOLD: f64 = 0.95;

/// Words that carry no identity in a team name ("the Sales team").
const NOISE_WORDS: &[&str] = &["the", "team", "squad", "group", "dept", "department"];

/// Fuzzy matcher for free-text names against a known list
pub struct FuzzyMatcher {
    /// Similarity threshold (0.0-1.0) for considering two strings as matches
    pub similarity_threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.80,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            similarity_threshold: threshold,
        }
    }

    /// Lowercases, strips punctuation and noise words, collapses whitespace.
    pub fn normalize(&self, s: &str) -> String {
        let lowered: String = s
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();

        let kept: Vec<&str> = lowered
            .split_whitespace()
            .filter(|w| !NOISE_WORDS.contains(w))
            .collect();

        if kept.is_empty() {
            WHITESPACE.replace_all(lowered.trim(), " ").to_string()
        } else {
            kept.join(" ")
        }
    }

    /// Score between 0.0 and 1.0 (higher = more similar)
    pub fn similarity(&self, s1: &str, s2: &str) -> f64 {
        let norm1 = self.normalize(s1);
        let norm2 = self.normalize(s2);
        if norm1.is_empty() || norm2.is_empty() {
            return 0.0;
        }
        if norm1 == norm2 {
            return 1.0;
        }

        let jw_score = jaro_winkler(&norm1, &norm2);

        // "Platform" vs "Platform Engineering"
        let is_substring = norm1.contains(&norm2) || norm2.contains(&norm1);
        let substring_bonus = if is_substring {
            let len_diff = (norm1.len() as f64 - norm2.len() as f64).abs();
            let max_len = norm1.len().max(norm2.len()) as f64;
            (1.0 - (len_diff / max_len)) * 0.1
        } else {
            0.0
        };

        (jw_score + substring_bonus).min(1.0)
    }

    pub fn is_match(&self, s1: &str, s2: &str) -> bool {
        self.similarity(s1, s2) >= self.similarity_threshold
    }

    /// Best candidate above the threshold, with its score.
    pub fn best_match<'a, T, F>(&self, target: &str, candidates: &'a [T], name_of: F) -> Option<(&'a T, f64)>
    where
        F: Fn(&T) -> &str,
    {
        candidates
            .iter()
            .map(|c| (c, self.similarity(target, name_of(c))))
            .filter(|(_, score)| *score >= self.similarity_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Finds a candidate mentioned somewhere in free text by sliding a
    /// window the size of each candidate name over the text's words.
    pub fn find_in_text<'a, T, F>(&self, text: &str, candidates: &'a [T], name_of: F) -> Option<(&'a T, f64)>
    where
        F: Fn(&T) -> &str,
    {
        let words: Vec<String> = self
            .normalize_keep_all(text)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(&'a T, f64)> = None;
        for candidate in candidates {
            let name = self.normalize(name_of(candidate));
            let width = name.split_whitespace().count().max(1);
            if width > words.len() {
                continue;
            }
            for window in words.windows(width) {
                let phrase = window.join(" ");
                let score = self.window_score(&phrase, &name, width);
                if score >= self.similarity_threshold && best.map_or(true, |(_, s)| score > s) {
                    best = Some((candidate, score));
                }
            }
        }
        best
    }

    /// Short words ("it", "hr") only count on an exact hit. Single-word
    /// names need a near-exact hit of similar length, so "productivity"
    /// never stands in for "Product".
    fn window_score(&self, phrase: &str, name: &str, width: usize) -> f64 {
        if phrase == name {
            return 1.0;
        }
        if name.len() <= 3 || phrase.len() <= 3 {
            return 0.0;
        }
        let score = jaro_winkler(phrase, name);
        if width == 1 {
            let (short, long) = (phrase.len().min(name.len()), phrase.len().max(name.len()));
            if score < SINGLE_WORD_THRESHOLD || (short as f64) < (long as f64) * 0.8 {
                return 0.0;
            }
        }
        score
    }

    fn normalize_keep_all(&self, s: &str) -> String {
        let lowered: String = s
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();
        WHITESPACE.replace_all(lowered.trim(), " ").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams() -> Vec<String> {
        vec![
            "Engineering".to_string(),
            "Customer Success".to_string(),
            "Marketing".to_string(),
            "HR".to_string(),
        ]
    }

    #[test]
    fn test_normalize_strips_noise() {
        let m = FuzzyMatcher::default();
        assert_eq!(m.normalize("The Engineering Team!"), "engineering");
        assert_eq!(m.normalize("  Customer   Success "), "customer success");
        assert_eq!(m.normalize("Team"), "team");
    }

    #[test]
    fn test_typo_matches() {
        let m = FuzzyMatcher::default();
        let teams = teams();
        let (hit, score) = m.best_match("engineerng", &teams, |t| t.as_str()).unwrap();
        assert_eq!(hit, "Engineering");
        assert!(score > 0.9);
    }

    #[test]
    fn test_unrelated_name_does_not_match() {
        let m = FuzzyMatcher::default();
        let teams = teams();
        assert!(m.best_match("finance", &teams, |t| t.as_str()).is_none());
    }

    #[test]
    fn test_find_in_text() {
        let m = FuzzyMatcher::default();
        let teams = teams();
        let (hit, _) = m
            .find_in_text("show users in the customer sucess team", &teams, |t| t.as_str())
            .unwrap();
        assert_eq!(hit, "Customer Success");

        let (hit, _) = m.find_in_text("list projects for hr", &teams, |t| t.as_str()).unwrap();
        assert_eq!(hit, "HR");

        assert!(m.find_in_text("list all projects", &teams, |t| t.as_str()).is_none());
    }

    #[test]
    fn test_find_in_text_ignores_longer_words() {
        let m = FuzzyMatcher::default();
        let teams = vec!["Product".to_string(), "Design".to_string(), "Engineering".to_string()];
        assert!(m
            .find_in_text("compare productivity across all teams", &teams, |t| t.as_str())
            .is_none());
        assert!(m.find_in_text("hours logged by designers", &teams, |t| t.as_str()).is_none());

        let (hit, _) = m.find_in_text("apps used by the engineerng team", &teams, |t| t.as_str()).unwrap();
        assert_eq!(hit, "Engineering");
    }
}
