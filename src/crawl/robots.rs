//! In-document robots directive parsing
//!
//! Handles `index`/`noindex`/`follow`/`nofollow`/`none` tokens from
//! `X-Robots-Tag` headers, `meta[name=robots]` tags, and anchor `rel`
//! attributes. Robots.txt is deliberately not consulted.

use crate::types::RobotsDirectives;

/// Parse one directive source into `(index, follow)` decisions.
///
/// Tokens are separated by spaces or commas and matched case-insensitively;
/// unknown tokens are ignored. Within a source the first occurrence of each
/// directive wins. `none` is shorthand for `noindex, nofollow`.
pub fn parse_directives(value: &str) -> (Option<bool>, Option<bool>) {
    let mut index = None;
    let mut follow = None;

    for token in value
        .split([' ', ','])
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        match token.to_ascii_lowercase().as_str() {
            "index" => {
                index.get_or_insert(true);
            }
            "noindex" => {
                index.get_or_insert(false);
            }
            "follow" => {
                follow.get_or_insert(true);
            }
            "nofollow" => {
                follow.get_or_insert(false);
            }
            "none" => {
                index.get_or_insert(false);
                follow.get_or_insert(false);
            }
            _ => {}
        }
    }

    (index, follow)
}

/// Merge directive sources in priority order.
///
/// Header values come before meta tags; within each, document order. The
/// first definite value for each of `index` and `follow` wins. Returns None
/// when no source stated anything, so callers can distinguish "absent" from
/// "explicitly permissive".
pub fn merge_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Option<RobotsDirectives> {
    let mut index = None;
    let mut follow = None;
    let mut any = false;

    for source in sources {
        let (i, f) = parse_directives(source);
        if i.is_some() || f.is_some() {
            any = true;
        }
        if index.is_none() {
            index = i;
        }
        if follow.is_none() {
            follow = f;
        }
        if index.is_some() && follow.is_some() {
            break;
        }
    }

    any.then(|| RobotsDirectives {
        index_page: index.unwrap_or(true),
        follow_links: follow.unwrap_or(true),
    })
}

/// Follow override for a single anchor's `rel` attribute.
///
/// Returns None when the attribute carries no follow directive.
pub fn link_follow_override(rel: &str) -> Option<bool> {
    parse_directives(rel).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_tokens() {
        assert_eq!(parse_directives("noindex"), (Some(false), None));
        assert_eq!(parse_directives("nofollow"), (None, Some(false)));
        assert_eq!(parse_directives("index"), (Some(true), None));
        assert_eq!(parse_directives("follow"), (None, Some(true)));
    }

    #[test]
    fn parses_comma_and_space_separated_tokens() {
        assert_eq!(
            parse_directives("noindex, nofollow"),
            (Some(false), Some(false))
        );
        assert_eq!(parse_directives("noindex nofollow"), (Some(false), Some(false)));
        assert_eq!(
            parse_directives("  noindex ,  follow  "),
            (Some(false), Some(true))
        );
    }

    #[test]
    fn none_sets_both_false() {
        assert_eq!(parse_directives("none"), (Some(false), Some(false)));
    }

    #[test]
    fn tokens_match_case_insensitively() {
        assert_eq!(parse_directives("NOINDEX, NoFollow"), (Some(false), Some(false)));
        assert_eq!(parse_directives("None"), (Some(false), Some(false)));
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        assert_eq!(parse_directives("noarchive, nosnippet"), (None, None));
        assert_eq!(
            parse_directives("noarchive, noindex"),
            (Some(false), None)
        );
    }

    #[test]
    fn first_occurrence_wins_within_a_source() {
        assert_eq!(parse_directives("noindex, index"), (Some(false), None));
        assert_eq!(parse_directives("follow, nofollow"), (None, Some(true)));
    }

    #[test]
    fn empty_input_decides_nothing() {
        assert_eq!(parse_directives(""), (None, None));
        assert_eq!(parse_directives("  ,  , "), (None, None));
    }

    #[test]
    fn merge_returns_none_without_sources() {
        assert_eq!(merge_sources([]), None);
        assert_eq!(merge_sources(["noarchive"]), None);
    }

    #[test]
    fn merge_first_definite_value_wins() {
        let merged = merge_sources(["noindex", "index, nofollow"]).unwrap();
        assert!(!merged.index_page);
        assert!(!merged.follow_links);
    }

    #[test]
    fn merge_fills_gaps_from_later_sources() {
        let merged = merge_sources(["nofollow", "noindex"]).unwrap();
        assert!(!merged.index_page);
        assert!(!merged.follow_links);
    }

    #[test]
    fn merge_defaults_undecided_fields_to_true() {
        let merged = merge_sources(["noindex"]).unwrap();
        assert!(!merged.index_page);
        assert!(merged.follow_links);
    }

    #[test]
    fn merge_none_source_forces_both_false() {
        let merged = merge_sources(["none"]).unwrap();
        assert!(!merged.index_page);
        assert!(!merged.follow_links);
    }

    #[test]
    fn link_rel_nofollow_overrides() {
        assert_eq!(link_follow_override("nofollow"), Some(false));
        assert_eq!(link_follow_override("noopener noreferrer nofollow"), Some(false));
        assert_eq!(link_follow_override("noopener"), None);
    }
}
