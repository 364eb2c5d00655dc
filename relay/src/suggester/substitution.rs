use std::collections::HashMap;

use async_trait::async_trait;
use regex::{Captures, Regex};

use crate::protocol::{Suggestion, SuggestionSource};
use crate::suggester::{GenerationError, SuggestionEngine};

/// A word is a run of letters, digits and apostrophes in any script.
pub(crate) const TOKEN_PATTERN: &str = r"[\p{L}\p{N}']+";

const CANNED_REPLIES: [&str; 3] = ["Thanks! 😊", "Got it, thanks!", "Okay, noted!"];

/// Credential-free corrector: swaps known slang and typo tokens, then capitalizes.
pub struct SubstitutionSuggester {
    table: HashMap<String, String>,
    token: Regex,
}

impl SubstitutionSuggester {
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_extra(&HashMap::new())
    }

    pub fn with_extra(extra: &HashMap<String, String>) -> Result<Self, regex::Error> {
        let mut table: HashMap<String, String> = HashMap::from([
            ("helo".to_string(), "hello".to_string()),
            ("im".to_string(), "I'm".to_string()),
            ("i'm".to_string(), "I'm".to_string()),
            ("i".to_string(), "I".to_string()),
            ("cant".to_string(), "can't".to_string()),
            ("dont".to_string(), "don't".to_string()),
            ("wont".to_string(), "won't".to_string()),
            ("ur".to_string(), "your".to_string()),
            ("u".to_string(), "you".to_string()),
            ("pls".to_string(), "please".to_string()),
            ("thx".to_string(), "thanks".to_string()),
        ]);
        for (wrong, right) in extra {
            let key = wrong.trim().to_lowercase();
            if !key.is_empty() {
                table.insert(key, right.clone());
            }
        }

        Ok(Self {
            table,
            token: Regex::new(TOKEN_PATTERN)?,
        })
    }

    pub fn correct(&self, text: &str) -> String {
        let replaced = self.token.replace_all(text, |caps: &Captures<'_>| {
            let word = &caps[0];
            match self.table.get(&word.to_lowercase()) {
                Some(replacement) if starts_uppercase(word) => capitalize_first(replacement),
                Some(replacement) => replacement.clone(),
                None => word.to_string(),
            }
        });
        capitalize_first(&replaced)
    }

    pub fn build(&self, text: &str) -> Suggestion {
        let corrected = self.correct(text.trim());
        let similar_phrases = vec![
            corrected.clone(),
            format!("{corrected}!"),
            format!("Hey, {}", corrected.to_lowercase()),
        ];

        Suggestion {
            replies: CANNED_REPLIES.iter().map(|reply| reply.to_string()).collect(),
            similar_phrases,
            corrected_text: corrected,
        }
    }
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl SuggestionEngine for SubstitutionSuggester {
    async fn suggest(&self, text: &str) -> Result<Suggestion, GenerationError> {
        Ok(self.build(text))
    }

    fn source(&self) -> SuggestionSource {
        SuggestionSource::Substitution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrects_slang_and_capitalizes() {
        let suggester = SubstitutionSuggester::new().unwrap();
        assert_eq!(suggester.correct("helo cant meet today"), "Hello can't meet today");
    }

    #[test]
    fn replaces_tokens_at_edges_and_before_punctuation() {
        let suggester = SubstitutionSuggester::new().unwrap();
        assert_eq!(
            suggester.correct("thx, see u tmrw. im late pls wait"),
            "Thanks, see you tmrw. I'm late please wait"
        );
    }

    #[test]
    fn leaves_words_containing_table_keys_alone() {
        let suggester = SubstitutionSuggester::new().unwrap();
        assert_eq!(suggester.correct("dimsum under umbrella"), "Dimsum under umbrella");
    }

    #[test]
    fn keeps_leading_capital_of_replaced_token() {
        let suggester = SubstitutionSuggester::new().unwrap();
        assert_eq!(suggester.correct("ok. Cant do it"), "Ok. Can't do it");
    }

    #[test]
    fn keeps_non_ascii_and_digit_words_whole() {
        let suggester = SubstitutionSuggester::new().unwrap();
        assert_eq!(suggester.correct("bir çiçek"), "Bir çiçek");
        assert_eq!(suggester.correct("see 2u"), "See 2u");
        assert_eq!(suggester.correct("çiçek aldım, u?"), "Çiçek aldım, you?");
        assert_eq!(suggester.correct("see u at i18n meetup"), "See you at i18n meetup");
    }

    #[test]
    fn extra_substitutions_override_defaults() {
        let extra = HashMap::from([
            ("Gonna".to_string(), "going to".to_string()),
            ("ur".to_string(), "you're".to_string()),
        ]);
        let suggester = SubstitutionSuggester::with_extra(&extra).unwrap();
        assert_eq!(suggester.correct("ur gonna love it"), "You're going to love it");
    }

    #[test]
    fn build_produces_three_replies_and_derived_phrases() {
        let suggester = SubstitutionSuggester::new().unwrap();
        let suggestion = suggester.build("  helo cant meet today ");
        assert_eq!(suggestion.corrected_text, "Hello can't meet today");
        assert_eq!(suggestion.replies.len(), 3);
        assert_eq!(
            suggestion.similar_phrases,
            vec![
                "Hello can't meet today".to_string(),
                "Hello can't meet today!".to_string(),
                "Hey, hello can't meet today".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn engine_never_fails() {
        let suggester = SubstitutionSuggester::new().unwrap();
        let result = suggester.suggest("").await.unwrap();
        assert_eq!(result.corrected_text, "");
        assert_eq!(result.replies.len(), 3);
    }
}
