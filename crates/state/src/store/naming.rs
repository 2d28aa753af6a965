// Default workspace titles: "Workspace <N>", N one past the highest in use.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_TITLE_PREFIX: &str = "Workspace";

fn numbered_title() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Workspace (\d+)$").expect("numbered title pattern should compile")
    })
}

/// Next default title given the titles currently in the collection.
///
/// Falls back to `count + 1` when no title is numbered, so gaps left by
/// closed workspaces never produce a duplicate default name.
pub fn next_default_title<'a, I>(titles: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut count = 0u64;
    let mut highest: Option<u64> = None;
    for title in titles {
        count += 1;
        let number = numbered_title()
            .captures(title)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<u64>().ok());
        if let Some(number) = number {
            highest = Some(highest.map_or(number, |current| current.max(number)));
        }
    }

    let next = match highest {
        Some(number) => number.saturating_add(1),
        None => count + 1,
    };
    format!("{DEFAULT_TITLE_PREFIX} {next}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collection_starts_at_one() {
        assert_eq!(next_default_title(Vec::<&str>::new()), "Workspace 1");
    }

    #[test]
    fn continues_after_highest_number() {
        assert_eq!(next_default_title(["Workspace 1", "Workspace 5", "Workspace 2"]), "Workspace 6");
    }

    #[test]
    fn gaps_do_not_cause_reuse() {
        // "Workspace 2" was closed earlier.
        assert_eq!(next_default_title(["Workspace 1", "Workspace 3"]), "Workspace 4");
    }

    #[test]
    fn unnumbered_titles_fall_back_to_count() {
        assert_eq!(next_default_title(["Research", "Drafts"]), "Workspace 3");
    }

    #[test]
    fn custom_titles_are_ignored_when_numbered_exist() {
        assert_eq!(next_default_title(["Research", "Workspace 2", "Drafts"]), "Workspace 3");
    }

    #[test]
    fn near_misses_are_not_numbered() {
        let titles = ["workspace 9", "Workspace 9 copy", "Workspace  9", "Workspace x"];
        assert_eq!(next_default_title(titles), "Workspace 5");
    }

    #[test]
    fn oversized_numbers_are_skipped() {
        assert_eq!(
            next_default_title(["Workspace 99999999999999999999999", "Workspace 3"]),
            "Workspace 4"
        );
    }
}
