//! Text normalization applied to every text run before it enters the script.
//!
//! The document compiler only depends on the [`TextNormalizer`] trait. The
//! stock implementation, [`RuleNormalizer`], applies the rules enabled in
//! [`Transforms`] in a fixed order and then escapes the result for SSML, so
//! every text item in a script is already synthesizer-ready.

use std::borrow::Cow;

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

use crate::settings::Transforms;

/// A pure `text -> text` transformation.
pub trait TextNormalizer {
    fn normalize(&self, text: &str) -> String;
}

impl<F> TextNormalizer for F
where
    F: Fn(&str) -> String,
{
    fn normalize(&self, text: &str) -> String {
        self(text)
    }
}

static RE_FOOTNOTE_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());
static RE_ROMAN_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?!I\s+[a-z])[IVXLCDM]+\b").unwrap());
static RE_ROMAN_VALID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^M*(?:D?C{0,3}|C[MD])(?:L?X{0,3}|X[CL])(?:V?I{0,3}|I[XV])$").unwrap()
});
static RE_DINKUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:\*\s*){3,}$").unwrap());
static RE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([#=_-])\s*(?:\1\s*)+$").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_KOPEEK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?<=\d)\s*к(?![a-zа-яё])|(?<![a-zа-яё])к\s*(?=\d)").unwrap()
});
static RE_RUBLEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?<=\d)\s*р(?![a-zа-яё])|(?<![a-zа-яё])р\s*(?=\d)").unwrap()
});
static RE_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)&(?:lt|gt|amp|quot|apos);").unwrap());

/// One normalization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    FilterSymbols,
    RemoveBrokenChars,
    RemoveFootnotesFromText,
    ConvertEllipsisToDots,
    ConvertRomeToNumber,
    ReplaceDinkus(String),
    RemoveSeparators,
    ReplaceNbSp,
    NormalizeWhitespace,
    PreventSpeechkitKopeek,
    PreventSpeechkitRubley,
}

impl Rule {
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match self {
            Rule::FilterSymbols => Cow::Owned(filter_symbols(text)),
            Rule::RemoveBrokenChars => replace_char(text, '\u{FFFD}', ""),
            Rule::RemoveFootnotesFromText => RE_FOOTNOTE_MARK.replace_all(text, ""),
            Rule::ConvertEllipsisToDots => replace_char(text, '…', "..."),
            Rule::ConvertRomeToNumber => {
                RE_ROMAN_WORD.replace_all(text, |caps: &Captures| number_from_roman(&caps[0]))
            }
            Rule::ReplaceDinkus(replacement) => {
                RE_DINKUS.replace_all(text, fancy_regex::NoExpand(replacement.as_str()))
            }
            Rule::RemoveSeparators => RE_SEPARATOR.replace_all(text, "-"),
            Rule::ReplaceNbSp => replace_char(text, '\u{a0}', " "),
            Rule::NormalizeWhitespace => RE_WHITESPACE.replace_all(text, " "),
            Rule::PreventSpeechkitKopeek => RE_KOPEEK.replace_all(text, ",${0},"),
            Rule::PreventSpeechkitRubley => RE_RUBLEY.replace_all(text, ",${0},"),
        }
    }
}

fn replace_char<'t>(text: &'t str, from: char, to: &str) -> Cow<'t, str> {
    if text.contains(from) {
        Cow::Owned(text.replace(from, to))
    } else {
        Cow::Borrowed(text)
    }
}

/// Applies an ordered list of [`Rule`]s, then escapes for SSML.
#[derive(Debug, Clone, Default)]
pub struct RuleNormalizer {
    rules: Vec<Rule>,
}

impl RuleNormalizer {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Build the rule list enabled by `transforms`, in canonical order.
    pub fn from_transforms(transforms: &Transforms) -> Self {
        let mut rules = Vec::new();
        let mut enable = |on: bool, rule: Rule| {
            if on {
                rules.push(rule);
            }
        };

        enable(transforms.filter_symbols, Rule::FilterSymbols);
        enable(transforms.remove_broken_chars, Rule::RemoveBrokenChars);
        enable(transforms.remove_footnotes_from_text, Rule::RemoveFootnotesFromText);
        enable(transforms.convert_ellipsis_to_dots, Rule::ConvertEllipsisToDots);
        enable(transforms.convert_rome_to_number, Rule::ConvertRomeToNumber);
        if let Some(replacement) = &transforms.replace_dinkus {
            enable(true, Rule::ReplaceDinkus(replacement.clone()));
        }
        enable(transforms.remove_separators, Rule::RemoveSeparators);
        enable(transforms.replace_nb_sp, Rule::ReplaceNbSp);
        enable(transforms.normalize_whitespace, Rule::NormalizeWhitespace);
        enable(transforms.prevent_speechkit_kopeek, Rule::PreventSpeechkitKopeek);
        enable(transforms.prevent_speechkit_rubley, Rule::PreventSpeechkitRubley);

        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl TextNormalizer for RuleNormalizer {
    fn normalize(&self, text: &str) -> String {
        let mut output = text.to_string();
        for rule in &self.rules {
            let changed = match rule.apply(&output) {
                Cow::Borrowed(_) => None,
                Cow::Owned(changed) => Some(changed),
            };
            if let Some(changed) = changed {
                output = changed;
            }
        }
        escape_xml(&output)
    }
}

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 10);
    for c in text.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}

/// Count the characters that carry speech: letters and digits, ignoring
/// punctuation, whitespace and escaped XML entities.
pub fn text_size(text: &str) -> usize {
    RE_ENTITY
        .replace_all(text, "")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .count()
}

/// Convert an upper-case Roman numeral to Arabic digits.
///
/// Anything that is not a well-formed numeral is returned unchanged.
pub fn number_from_roman(roman: &str) -> String {
    if roman.is_empty() || !RE_ROMAN_VALID.is_match(roman).unwrap_or(false) {
        return roman.to_string();
    }

    let value = |c: char| match c {
        'M' => 1000,
        'D' => 500,
        'C' => 100,
        'L' => 50,
        'X' => 10,
        'V' => 5,
        'I' => 1,
        _ => 0,
    };

    let digits: Vec<i64> = roman.chars().map(value).collect();
    let mut total = 0i64;
    for (i, &digit) in digits.iter().enumerate() {
        match digits.get(i + 1) {
            Some(&next) if next > digit => total -= digit,
            _ => total += digit,
        }
    }

    total.to_string()
}

/// Keep only characters the synthesizer reads reliably; map the rest to a
/// readable substitute or drop them.
pub fn filter_symbols(text: &str) -> String {
    let mut output = String::with_capacity(text.len());

    for c in text.chars() {
        if is_whitelisted(c) {
            output.push(c);
        } else if let Some(replacement) = symbol_replacement(c) {
            output.push_str(replacement);
        }
    }

    output
}

fn is_whitelisted(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
        || "- ?!.,:;=+@#$%^&*~'\"±<>§°£₽€®™_/".contains(c)
}

fn symbol_replacement(c: char) -> Option<&'static str> {
    let replacement = match c {
        '—' | '–' | '−' => "-",
        '«' | '»' | '„' | '“' | '”' => "\"",
        '‘' | '’' | '`' => "'",
        '\\' => "/",
        'Α' => "Алфа ",
        'α' => "алфа ",
        'Β' => "Вита ",
        'β' => "вита ",
        'Γ' => "Гама ",
        'γ' => "гама ",
        'Δ' => "Делта ",
        'δ' => "делта ",
        'Ε' => "Эпсилон ",
        'ε' => "эпсилон ",
        'Ζ' => "Зита ",
        'ζ' => "зита ",
        'Η' => "Ита ",
        'η' => "ита ",
        'Θ' => "Тита ",
        'θ' => "тита ",
        'Ι' => "Йота ",
        'ι' => "йота ",
        'Κ' => "Капа ",
        'κ' => "капа ",
        'Λ' => "Лямбда ",
        'λ' => "лямбда ",
        'Μ' => "Ми ",
        'μ' => "ми ",
        'Ν' => "Ни ",
        'ν' => "ни ",
        'Ξ' => "Кси ",
        'ξ' => "кси ",
        'Ο' => "Омикрон ",
        'ο' => "омикрон ",
        'Π' => "Пи ",
        'π' => "пи ",
        'Ρ' => "Ро ",
        'ρ' => "ро ",
        'Σ' => "Сигма ",
        'σ' | 'ς' => "сигма ",
        'Τ' => "Таф ",
        'τ' => "таф ",
        'Υ' => "Ипсилон ",
        'υ' => "ипсилон ",
        'Φ' => "Фи ",
        'φ' => "фи ",
        'Χ' => "Хи ",
        'χ' => "хи ",
        'Ψ' => "Пси ",
        'ψ' => "пси ",
        'Ω' => "Омега ",
        'ω' => "омега ",
        _ => return None,
    };
    Some(replacement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_normalizer() -> RuleNormalizer {
        RuleNormalizer::from_transforms(&Transforms::default())
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;&lt;/a&gt;");
    }

    #[test]
    fn test_default_pipeline() {
        let normalizer = default_normalizer();
        assert_eq!(normalizer.normalize("Глава XIV…\n\n  далее[12]"), "Глава 14... далее");
        assert_eq!(normalizer.normalize("a\u{a0}b"), "a b");
        assert_eq!(normalizer.normalize("x < y"), "x &lt; y");
    }

    #[test]
    fn test_whitespace_between_blocks_collapses_to_single_space() {
        assert_eq!(default_normalizer().normalize("\n\t\t"), " ");
    }

    #[test]
    fn test_roman_numerals() {
        assert_eq!(number_from_roman("IV"), "4");
        assert_eq!(number_from_roman("MCMXCIV"), "1994");
        assert_eq!(number_from_roman("XL"), "40");
        assert_eq!(number_from_roman("IIII"), "IIII");
        assert_eq!(number_from_roman("VX"), "VX");
    }

    #[test]
    fn test_roman_pronoun_left_alone() {
        let rule = Rule::ConvertRomeToNumber;
        assert_eq!(rule.apply("I am Henry VIII"), "I am Henry 8");
    }

    #[test]
    fn test_separators_and_dinkus() {
        assert_eq!(Rule::RemoveSeparators.apply(" = = = "), "-");
        assert_eq!(Rule::RemoveSeparators.apply("a = b"), "a = b");
        let dinkus = Rule::ReplaceDinkus("пауза".into());
        assert_eq!(dinkus.apply("* * *"), "пауза");
        assert_eq!(dinkus.apply("**"), "**");
    }

    #[test]
    fn test_dinkus_disabled_by_default() {
        assert!(!default_normalizer()
            .rules()
            .iter()
            .any(|r| matches!(r, Rule::ReplaceDinkus(_))));
    }

    #[test]
    fn test_kopeek_and_rubley() {
        assert_eq!(Rule::PreventSpeechkitKopeek.apply("5к"), "5,к,");
        assert_eq!(Rule::PreventSpeechkitKopeek.apply("кот 5"), "кот 5");
        assert_eq!(Rule::PreventSpeechkitRubley.apply("10 р"), "10, р,");
    }

    #[test]
    fn test_filter_symbols() {
        assert_eq!(filter_symbols("«Да» — α"), "\"Да\" - алфа ");
        assert_eq!(filter_symbols("a\u{2603}b"), "ab");
    }

    #[test]
    fn test_text_size_ignores_entities_and_punctuation() {
        assert_eq!(text_size("Hello, world!"), 10);
        assert_eq!(text_size("&lt;&amp;&gt; Да"), 2);
        assert_eq!(text_size(" "), 0);
    }

    #[test]
    fn test_closure_is_a_normalizer() {
        let upper = |t: &str| t.to_uppercase();
        assert_eq!(upper.normalize("abc"), "ABC");
    }
}
