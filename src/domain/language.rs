//! Language tie-break between candidate display texts.

use super::types::{LanguageTag, TextValue};

/// Rank assigned to each language of a preference list.
///
/// Lower is better. Languages outside the table share the worst rank.
#[derive(Debug, Clone)]
struct RankTable {
    ranked: Vec<LanguageTag>,
}

impl RankTable {
    fn new(effective: &LanguageTag, fallbacks: &[LanguageTag]) -> Self {
        let mut ranked = Vec::with_capacity(fallbacks.len() + 2);
        ranked.push(effective.clone());
        for language in fallbacks {
            if !ranked.contains(language) {
                ranked.push(language.clone());
            }
        }
        // "no language" is an implicit fallback behind every explicit preference.
        if !ranked.iter().any(LanguageTag::is_none) {
            ranked.push(LanguageTag::none());
        }
        Self { ranked }
    }

    fn rank(&self, language: &LanguageTag) -> usize {
        self.ranked
            .iter()
            .position(|candidate| candidate == language)
            .unwrap_or(self.ranked.len())
    }
}

/// Picks the best candidate for the given language preferences.
///
/// Candidates are scanned in order: a value in `effective` wins immediately,
/// otherwise the best ranked value wins and the earliest one breaks ties.
/// Returns `None` only when there are no candidates.
pub fn select_preferred<'a, I>(
    candidates: I,
    effective: &LanguageTag,
    fallbacks: &[LanguageTag],
) -> Option<&'a TextValue>
where
    I: IntoIterator<Item = &'a TextValue>,
{
    let table = RankTable::new(effective, fallbacks);
    let mut best: Option<(usize, &'a TextValue)> = None;

    for candidate in candidates {
        let rank = table.rank(&candidate.language);
        if rank == 0 {
            return Some(candidate);
        }
        match best {
            Some((best_rank, _)) if best_rank <= rank => {}
            _ => best = Some((rank, candidate)),
        }
    }

    best.map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<LanguageTag> {
        values.iter().map(|value| LanguageTag::new(value)).collect()
    }

    fn pick<'a>(candidates: &'a [TextValue], preferred: &[&str]) -> Option<&'a str> {
        let preferred = tags(preferred);
        select_preferred(candidates, &preferred[0], &preferred[1..]).map(|v| v.text.as_str())
    }

    #[test]
    fn effective_language_wins_immediately() {
        let candidates = [
            TextValue::plain("Plain"),
            TextValue::new("House", "en"),
            TextValue::new("Haus", "de"),
        ];
        assert_eq!(pick(&candidates, &["de", "en"]), Some("Haus"));
    }

    #[test]
    fn falls_back_to_next_preferred_language() {
        let candidates = [TextValue::new("Maison", "fr"), TextValue::new("House", "en")];
        assert_eq!(pick(&candidates, &["de", "en"]), Some("House"));
    }

    #[test]
    fn untagged_value_ranks_after_explicit_preferences() {
        let candidates = [TextValue::plain("Plain"), TextValue::new("House", "en")];
        assert_eq!(pick(&candidates, &["de", "en"]), Some("House"));
    }

    #[test]
    fn untagged_value_beats_unranked_language() {
        let candidates = [TextValue::new("Maison", "fr"), TextValue::plain("Plain")];
        assert_eq!(pick(&candidates, &["de"]), Some("Plain"));
    }

    #[test]
    fn unranked_language_beats_nothing() {
        let candidates = [TextValue::new("Maison", "fr")];
        assert_eq!(pick(&candidates, &["de", "en"]), Some("Maison"));
    }

    #[test]
    fn earliest_candidate_wins_ties() {
        let candidates = [
            TextValue::new("First", "en"),
            TextValue::new("Second", "en"),
            TextValue::new("Maison", "fr"),
        ];
        assert_eq!(pick(&candidates, &["de", "en"]), Some("First"));

        let unranked = [TextValue::new("Casa", "es"), TextValue::new("Maison", "fr")];
        assert_eq!(pick(&unranked, &["de"]), Some("Casa"));
    }

    #[test]
    fn no_candidates_yield_no_value() {
        assert_eq!(pick(&[], &["en"]), None);
    }

    #[test]
    fn explicit_empty_tag_keeps_its_position() {
        let candidates = [TextValue::new("House", "en"), TextValue::plain("Plain")];
        assert_eq!(pick(&candidates, &["de", "", "en"]), Some("Plain"));
    }

    #[test]
    fn empty_effective_language_prefers_untagged_values() {
        let candidates = [TextValue::new("House", "en"), TextValue::plain("Plain")];
        assert_eq!(pick(&candidates, &["", "en"]), Some("Plain"));
    }

    #[test]
    fn repeated_preferences_do_not_shift_ranks() {
        let candidates = [TextValue::plain("Plain"), TextValue::new("Maison", "fr")];
        assert_eq!(pick(&candidates, &["de", "de", "fr"]), Some("Maison"));
    }

    #[test]
    fn matching_ignores_tag_case() {
        let candidates = [TextValue::new("Colour", "EN-GB"), TextValue::new("Color", "en")];
        assert_eq!(pick(&candidates, &["en-gb"]), Some("Colour"));
    }
}
