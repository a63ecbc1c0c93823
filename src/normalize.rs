//! Title cleanup for provider search. MovieLens-style titles carry a year
//! suffix, parenthetical aliases, and trailing articles ("Matrix, The") that
//! the provider's search endpoint does not understand.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn year_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(\d{4}\)\s*$").expect("static regex"))
}

fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^)]*\)").expect("static regex"))
}

fn trailing_article_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.*),\s*(A|An|The)\s*$").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("static regex"))
}

/// Rewrite a trailing `", The/A/An"` into a leading article.
fn untail_article(title: &str) -> String {
    let trimmed = title.trim();
    match trailing_article_re().captures(trimmed) {
        Some(caps) => {
            let core = caps[1].trim();
            let article = caps[2].trim();
            format!("{article} {core}")
        }
        None => trimmed.to_string(),
    }
}

/// Canonical form: year suffix stripped, parentheticals removed, trailing
/// article moved to the front, whitespace collapsed. Idempotent.
pub fn normalize(title: &str) -> String {
    let t = year_suffix_re().replace(title, "");
    let t = parenthetical_re().replace_all(&t, "");
    let t = untail_article(&t);
    whitespace_re().replace_all(&t, " ").trim().to_string()
}

/// Ordered, deduplicated search variants: the canonical form with and
/// without the year, plus the article-swapped form when the canonical title
/// still ends in a trailing article. Order is the order of preference.
pub fn candidates(title: &str, year: Option<i32>) -> Vec<(String, Option<i32>)> {
    let base = normalize(title);
    let mut out: Vec<(String, Option<i32>)> = vec![(base.clone(), year), (base.clone(), None)];

    if trailing_article_re().is_match(&base) {
        let swapped = untail_article(&base);
        if swapped != base {
            out.push((swapped.clone(), year));
            out.push((swapped, None));
        }
    }

    let mut seen: HashSet<(String, Option<i32>)> = HashSet::new();
    out.retain(|(text, y)| seen.insert((text.to_lowercase(), *y)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_year_and_parentheticals() {
        assert_eq!(normalize("Toy Story (1995)"), "Toy Story");
        assert_eq!(
            normalize("City of Lost Children, The (Cité des enfants perdus, La) (1995)"),
            "The City of Lost Children"
        );
    }

    #[test]
    fn untails_article() {
        assert_eq!(normalize("Few Good Men, A (1992)"), "A Few Good Men");
        assert_eq!(normalize("American President, The (1995)"), "The American President");
        assert_eq!(normalize("Matrix, the (1999)"), "the Matrix");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  Heat   (1995)  "), "Heat");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "Matrix, The (1999)",
            "Seven (a.k.a. Se7en) (1995)",
            "Few Good Men, A",
            "Heat",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn candidates_order_and_dedup() {
        let got = candidates("Matrix, The (1999)", Some(1999));
        assert_eq!(
            got,
            vec![
                ("The Matrix".to_string(), Some(1999)),
                ("The Matrix".to_string(), None),
            ]
        );
    }

    #[test]
    fn candidates_without_year_collapse() {
        let got = candidates("Heat (1995)", None);
        assert_eq!(got, vec![("Heat".to_string(), None)]);
    }

    #[test]
    fn candidates_bounded_and_deterministic() {
        let got = candidates("The Matrix, The (1999)", Some(1999));
        assert!(got.len() <= 4);
        assert_eq!(got, candidates("The Matrix, The (1999)", Some(1999)));
    }
}
