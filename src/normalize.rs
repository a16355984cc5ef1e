use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing academic titles such as ", S.Pd" or " M.Ag.", separated by a comma or a space.
static TRAILING_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:,\s*|\s+)(s\.\s?pd|m\.\s?pd|s\.\s?ag|m\.\s?ag|lc|s\.\s?e|m\.\s?m)\.?$")
        .expect("title pattern is valid")
});

/// Lower-cases, collapses whitespace runs to a single space and trims.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Removes trailing academic titles. Stacked titles ("..., S.Pd, M.Pd") are all removed.
pub fn strip_titles(key: &str) -> String {
    let mut current = key.trim().to_string();
    loop {
        let stripped = TRAILING_TITLE.replace(&current, "").trim().to_string();
        if stripped == current || stripped.is_empty() {
            return current;
        }
        current = stripped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize("  Budi   Santoso\t"), "budi santoso");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn strip_titles_removes_trailing_academic_titles() {
        assert_eq!(strip_titles("budi santoso, s.pd"), "budi santoso");
        assert_eq!(strip_titles("agus amin, s.ag."), "agus amin");
        assert_eq!(strip_titles("rino mukti, s. pd"), "rino mukti");
        assert_eq!(strip_titles("akrom adabi m.ag"), "akrom adabi");
        assert_eq!(strip_titles("siti aminah, s.pd, m.pd"), "siti aminah");
    }

    #[test]
    fn strip_titles_leaves_plain_names_alone() {
        assert_eq!(strip_titles("didi madhari"), "didi madhari");
        assert_eq!(strip_titles(""), "");
    }
}
