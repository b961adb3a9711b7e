//! Normalization of titles and person names into match keys.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "mx", "dr", "prof", "professor", "sir", "dame", "rev",
];

/// How punctuation is treated while folding
#[derive(Clone, Copy, PartialEq, Eq)]
enum Punctuation {
    /// Deleted in place: "AS/400" and "AS400" agree, as do "R.P.G." and "RPG"
    Delete,
    /// Turned into a word break, except apostrophes which are deleted
    Break,
}

/// Fold case, strip diacritics and punctuation, and collapse whitespace.
fn fold(s: &str, punctuation: Punctuation) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            '\'' | '\u{2019}' | '`' => None,
            _ if punctuation == Punctuation::Break => Some(' '),
            _ => None,
        })
        .collect();

    WHITESPACE.replace_all(folded.trim(), " ").into_owned()
}

/// Normalized form of a book title.
///
/// Punctuation is deleted rather than split on; only whitespace separates words.
pub fn normalize_title(title: &str) -> String {
    fold(title, Punctuation::Delete)
}

/// Split a raw title into its main title and subtitle at the first colon.
pub fn split_subtitle(title: &str) -> (&str, Option<&str>) {
    match title.split_once(':') {
        Some((main, sub)) if !main.trim().is_empty() && !sub.trim().is_empty() => {
            (main.trim(), Some(sub.trim()))
        }
        _ => (title.trim(), None),
    }
}

/// All normalized forms a title is compared under: the full title first,
/// then the main title without its subtitle when the two differ.
pub fn title_forms(title: &str) -> Vec<String> {
    let full = normalize_title(title);
    let mut forms = vec![full];

    if let (main, Some(_)) = split_subtitle(title) {
        let main = normalize_title(main);
        if !main.is_empty() && !forms.contains(&main) {
            forms.push(main);
        }
    }

    forms
}

/// Normalized dedup key for a person name.
///
/// Honorifics are dropped and the remaining tokens are sorted, so
/// "Helgren, Pete" and "Pete Helgren" share a key. The key is purely
/// textual; no attempt is made to parse surname and given names.
pub fn normalize_author_name(name: &str) -> String {
    let folded = fold(name, Punctuation::Break);
    let mut tokens: Vec<&str> = folded
        .split(' ')
        .filter(|t| !t.is_empty() && !HONORIFICS.contains(t))
        .collect();

    // A name made only of honorifics keeps them rather than vanishing.
    if tokens.is_empty() {
        tokens = folded.split(' ').filter(|t| !t.is_empty()).collect();
    }

    tokens.sort_unstable();
    tokens.join(" ")
}

/// Trim a free-text attribute, mapping blank strings to `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  RPG   Subfile  Guide "), "rpg subfile guide");
        assert_eq!(normalize_title("R.P.G. -- Subfile Guide!"), "rpg subfile guide");
        assert_eq!(normalize_title("AS/400 Expert"), normalize_title("as400 expert"));
        assert_eq!(normalize_title("Don't Panic"), "dont panic");
        assert_eq!(normalize_title("Les Misérables"), "les miserables");
        assert_eq!(normalize_title("!!!"), "");
    }

    #[test]
    fn test_title_forms_with_subtitle() {
        assert_eq!(
            title_forms("Programming Rust: Fast, Safe Systems"),
            vec!["programming rust fast safe systems", "programming rust"]
        );
        assert_eq!(title_forms("No Subtitle"), vec!["no subtitle"]);
        assert_eq!(title_forms(": leading colon"), vec!["leading colon"]);
    }

    #[test]
    fn test_split_subtitle() {
        assert_eq!(split_subtitle("Main: Sub"), ("Main", Some("Sub")));
        assert_eq!(split_subtitle("Main:"), ("Main:", None));
    }

    #[test]
    fn test_normalize_author_name() {
        assert_eq!(normalize_author_name("Pete Helgren"), "helgren pete");
        assert_eq!(normalize_author_name("Helgren, Pete"), "helgren pete");
        assert_eq!(normalize_author_name("Helgren,Pete"), "helgren pete");
        assert_eq!(normalize_author_name("O'Brien, Flann"), "flann obrien");
        assert_eq!(normalize_author_name("Dr. José  Núñez"), "jose nunez");
        assert_eq!(normalize_author_name("  PROF  jane DOE "), "doe jane");
        assert_eq!(normalize_author_name("Sir"), "sir");
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" x ")), Some("x".to_string()));
    }
}
