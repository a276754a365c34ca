//! Text normalizer (spec §4.1).
//!
//! NFKC, smart-quote/dash/ellipsis folding, whitespace collapse with
//! paragraph-break preservation, then profile-driven number/acronym
//! expansion via [`crate::preprocess::TextPreprocessor`] (teacher's
//! `preprocess.rs`, tuned here to keep punctuation and case — the
//! chunker and resolver both depend on both).

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::chunk::{AcronymMode, NumberMode, ReadingProfile};
use crate::preprocess::{PreprocessorConfig, TextPreprocessor};

static RE_PARA_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*\n[ \t]*").unwrap());
static RE_ACRONYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,6}\b").unwrap());

const PARA_BREAK_SENTINEL: &str = "\u{0}PARA\u{0}";

/// Fold smart quotes, dashes, and ellipses to their ASCII/plain equivalents.
fn fold_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            _ => c,
        })
        .collect::<String>()
        .replace('\u{2026}', "...")
}

/// Spell out ALL-CAPS acronyms letter by letter (`acronym_mode = spell`).
///
/// Grounded on spec §4.1's reading-profile enumeration; not present in the
/// teacher, so implemented directly against the spec's description.
fn spell_out_acronyms(text: &str) -> String {
    RE_ACRONYM
        .replace_all(text, |caps: &regex::Captures| {
            caps[0]
                .chars()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .into_owned()
}

fn preprocessor_config_for(profile: &ReadingProfile) -> PreprocessorConfig {
    PreprocessorConfig {
        lowercase: false,
        remove_punctuation: false,
        remove_extra_whitespace: false,
        remove_html: false,
        remove_urls: false,
        remove_emails: false,
        expand_ordinals: profile.number_mode == NumberMode::Ordinal,
        replace_numbers: profile.number_mode != NumberMode::Year,
        ..PreprocessorConfig::default()
    }
}

/// Normalize `text` per spec §4.1: NFKC, quote/dash/ellipsis folding,
/// whitespace collapse (preserving paragraph breaks), then profile-driven
/// number/acronym expansion.
pub fn normalize(text: &str, profile: &ReadingProfile) -> String {
    let nfkc: String = text.nfkc().collect();
    let folded = fold_punctuation(&nfkc);

    // Protect paragraph breaks (double newline) before whitespace collapse.
    let protected = RE_PARA_BREAK.replace_all(&folded, PARA_BREAK_SENTINEL);
    let single_lined = RE_BLANK_LINES.replace_all(&protected, " ");
    let collapsed = RE_WHITESPACE.replace_all(&single_lined, " ");
    let restored = collapsed.replace(PARA_BREAK_SENTINEL, "\n\n");

    let spelled = if profile.acronym_mode == AcronymMode::Spell {
        spell_out_acronyms(&restored)
    } else {
        restored
    };

    let preprocessor = TextPreprocessor::with_config(preprocessor_config_for(profile));
    let expanded = preprocessor.process(&spelled);

    // TextPreprocessor's remove_extra_whitespace is disabled above (it would
    // also eat the paragraph-break sentinel logic); collapse runs of spaces
    // introduced by expansion while keeping `\n\n` intact.
    expanded
        .split("\n\n")
        .map(|para| RE_WHITESPACE.replace_all(para.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_smart_quotes_and_dashes() {
        let out = normalize("\u{201C}Hello\u{201D} \u{2014} world\u{2026}", &ReadingProfile::default());
        assert_eq!(out, "\"Hello\" - world...");
    }

    #[test]
    fn preserves_paragraph_breaks() {
        let out = normalize("Para one.\n\nPara two.", &ReadingProfile::default());
        assert_eq!(out, "Para one.\n\nPara two.");
    }

    #[test]
    fn collapses_internal_whitespace() {
        let out = normalize("Hello    world\t\tfoo", &ReadingProfile::default());
        assert_eq!(out, "Hello world foo");
    }

    #[test]
    fn spells_out_acronyms_when_requested() {
        let mut profile = ReadingProfile::default();
        profile.acronym_mode = AcronymMode::Spell;
        let out = normalize("Ask the FBI", &profile);
        assert!(out.contains("F B I"), "got: {out}");
    }

    #[test]
    fn leaves_acronyms_alone_by_default() {
        let out = normalize("Ask the FBI", &ReadingProfile::default());
        assert!(out.contains("FBI"));
    }

    #[test]
    fn drops_year_mode_number_expansion() {
        let mut profile = ReadingProfile::default();
        profile.number_mode = NumberMode::Year;
        let out = normalize("It happened in 1998.", &profile);
        assert!(out.contains("1998"), "got: {out}");
    }
}
