//! Builds the anchor point / annotation chain for one article.
//!
//! Matches from every dictionary are merged into one offset-ordered sequence;
//! each element gets the distances to its neighbours in that sequence and a
//! short phrase of surrounding text on either side.

use tracing::debug;

use crate::dictionary::DictionaryMatch;
use crate::record::{AnchorPoint, Annotation};

/// Minimum size, in bytes, of a context phrase before it is extended to the
/// next whitespace.
pub const PHRASE_TARGET_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Backward,
    Forward,
}

/// Context phrase on one side of `start`, using [`PHRASE_TARGET_SIZE`].
pub fn find_phrase(text: &str, start: usize, direction: SearchDirection) -> &str {
    find_phrase_within(text, start, direction, PHRASE_TARGET_SIZE)
}

/// Context phrase on one side of `start`.
///
/// The scan jumps `window` bytes in `direction` and then walks one byte at a
/// time until it sits on ASCII whitespace or runs off the buffer, so the
/// phrase never ends part-way through a word. The scan index is clamped to
/// `[0, len - 1]`:
///
/// - backward: `text[boundary..start]`, where `boundary` is the whitespace
///   byte or `0`;
/// - forward: `text[start..boundary]`, where `boundary` is the whitespace
///   byte or `len`.
///
/// `start` values past the end are clamped to `len`.
pub fn find_phrase_within(
    text: &str,
    start: usize,
    direction: SearchDirection,
    window: usize,
) -> &str {
    let bytes = text.as_bytes();
    let len = bytes.len();
    if len == 0 {
        return "";
    }
    let start = start.min(len);

    let boundary = match direction {
        SearchDirection::Backward => {
            let mut target = start.checked_sub(window).map(|t| t.min(len - 1));
            loop {
                match target {
                    None => break 0,
                    Some(t) if bytes[t].is_ascii_whitespace() => break t,
                    Some(t) => target = t.checked_sub(1),
                }
            }
        }
        SearchDirection::Forward => {
            let mut target = start.saturating_add(window);
            loop {
                if target > len - 1 {
                    break len;
                }
                if bytes[target].is_ascii_whitespace() {
                    break target;
                }
                target += 1;
            }
        }
    };

    let (lo, hi) = if start <= boundary {
        (start, boundary)
    } else {
        (boundary, start)
    };
    // Widen to char boundaries so multi-byte characters are never split.
    let lo = (0..=lo).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    let hi = (hi..=len).find(|&i| text.is_char_boundary(i)).unwrap_or(len);
    &text[lo..hi]
}

/// Turn the unordered matches for one article into the anchor chain.
///
/// Matches are stably sorted by offset, so equal offsets keep the order they
/// were supplied in (dictionary order, then entry order). Distances are
/// measured to the adjacent matches of the merged sequence and are absent at
/// either end.
pub fn build_anchor_points(
    text: &str,
    mut matches: Vec<DictionaryMatch<'_>>,
    time_code: &str,
) -> Vec<AnchorPoint> {
    matches.sort_by_key(|m| m.offset);
    debug!(count = matches.len(), "building anchor chain");

    let last = matches.len().saturating_sub(1);
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let term = &m.entry.term;
            let distance_to_preceding = (i > 0).then(|| m.offset - matches[i - 1].offset);
            let distance_to_following = (i < last).then(|| matches[i + 1].offset - m.offset);

            AnchorPoint {
                preceding_phrase: find_phrase(text, m.offset, SearchDirection::Backward)
                    .to_string(),
                following_phrase: find_phrase(text, m.offset + term.len(), SearchDirection::Forward)
                    .to_string(),
                distance_to_preceding,
                distance_to_following,
                character_number: m.offset,
                time_code: time_code.to_string(),
                annotation: Annotation {
                    term_found: term.clone(),
                    length_of_term_found: term.len(),
                    wikidata_item_code: m.entry.identifiers.wikidata.clone(),
                    dictionary_name: m.dictionary.id.clone(),
                    time_code: time_code.to_string(),
                    ..Default::default()
                },
                ..Default::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{Dictionary, DictionaryEntry, find_all_matches};

    fn dict(id: &str, terms: &[&str]) -> Dictionary {
        let entries = terms
            .iter()
            .map(|t| DictionaryEntry {
                name: t.to_string(),
                term: t.to_string(),
                identifiers: Default::default(),
            })
            .collect();
        Dictionary::new(id, entries).unwrap()
    }

    #[test]
    fn backward_scan_clamps_to_start_of_text() {
        let text = "aaa bbbbbbbbbb ccc";
        assert_eq!(text.len(), 18);
        // Scan starts at 2, walks back through "aa" and clamps at 0.
        assert_eq!(find_phrase_within(text, 4, SearchDirection::Backward, 2), "aaa ");
    }

    #[test]
    fn backward_scan_stops_at_whitespace() {
        let text = "one two three target";
        assert_eq!(
            find_phrase_within(text, 14, SearchDirection::Backward, 5),
            " three "
        );
    }

    #[test]
    fn forward_scan_stops_at_whitespace() {
        let text = "target one two";
        assert_eq!(find_phrase_within(text, 6, SearchDirection::Forward, 3), " one");
    }

    #[test]
    fn forward_scan_clamps_to_end_of_text() {
        let text = "aaa bbbbbbbbbb ccc";
        assert_eq!(find_phrase_within(text, 14, SearchDirection::Forward, 2), " ccc");
        assert_eq!(find_phrase_within(text, 18, SearchDirection::Forward, 2), "");
        assert_eq!(find_phrase_within(text, 500, SearchDirection::Forward, 2), "");
    }

    #[test]
    fn phrases_at_the_edges_do_not_panic() {
        let text = "word";
        assert_eq!(find_phrase(text, 0, SearchDirection::Backward), "");
        assert_eq!(find_phrase(text, 4, SearchDirection::Forward), "");
        assert_eq!(find_phrase(text, 4, SearchDirection::Backward), "word");
        assert_eq!(find_phrase("", 0, SearchDirection::Forward), "");
        assert_eq!(find_phrase_within(text, 4, SearchDirection::Backward, 0), "word");
    }

    #[test]
    fn phrase_is_whole_text_when_no_whitespace() {
        let text = "x".repeat(300);
        assert_eq!(find_phrase(&text, 150, SearchDirection::Backward).len(), 150);
        assert_eq!(find_phrase(&text, 150, SearchDirection::Forward).len(), 150);
    }

    #[test]
    fn phrases_respect_multibyte_text() {
        let text = "naïve café zika fièvre élevée";
        let start = text.find("zika").unwrap();
        let before = find_phrase_within(text, start, SearchDirection::Backward, 3);
        let after = find_phrase_within(text, start + 4, SearchDirection::Forward, 3);
        assert_eq!(before, " café ");
        assert_eq!(after, " fièvre");
    }

    #[test]
    fn distances_between_adjacent_matches() {
        let dicts = vec![dict("d", &["alpha", "beta"])];
        let text = "alpha then beta and alpha";
        let anchors = build_anchor_points(text, find_all_matches(&dicts, text), "now");

        let offsets: Vec<usize> = anchors.iter().map(|a| a.character_number).collect();
        assert_eq!(offsets, vec![0, 11, 20]);

        assert_eq!(anchors[0].distance_to_preceding, None);
        assert_eq!(anchors[0].distance_to_following, Some(11));
        assert_eq!(anchors[1].distance_to_preceding, Some(11));
        assert_eq!(anchors[1].distance_to_following, Some(9));
        assert_eq!(anchors[2].distance_to_preceding, Some(9));
        assert_eq!(anchors[2].distance_to_following, None);
    }

    #[test]
    fn merged_matches_sorted_with_stable_ties() {
        let dicts = vec![dict("first", &["gene"]), dict("second", &["gene", "protein"])];
        let text = "protein gene";
        let anchors = build_anchor_points(text, find_all_matches(&dicts, text), "now");

        let seq: Vec<(usize, &str)> = anchors
            .iter()
            .map(|a| (a.character_number, a.annotation.dictionary_name.as_str()))
            .collect();
        assert_eq!(seq, vec![(0, "second"), (8, "first"), (8, "second")]);
        assert_eq!(anchors[2].distance_to_preceding, Some(0));
        for pair in anchors.windows(2) {
            assert!(pair[0].character_number <= pair[1].character_number);
        }
    }

    #[test]
    fn annotation_carries_term_metadata() {
        let entries = vec![DictionaryEntry {
            name: "Zika virus".into(),
            term: "zika".into(),
            identifiers: crate::dictionary::EntryIdentifiers {
                contentmine: "CM.zika".into(),
                wikidata: "Q202864".into(),
            },
        }];
        let dicts = vec![Dictionary::new("viruses", entries).unwrap()];
        let text = "the zika outbreak";
        let anchors = build_anchor_points(text, find_all_matches(&dicts, text), "t0");

        assert_eq!(anchors.len(), 1);
        let a = &anchors[0];
        assert_eq!(a.preceding_phrase, "the ");
        assert_eq!(a.following_phrase, " outbreak");
        assert_eq!(a.time_code, "t0");
        assert_eq!(a.annotation.term_found, "zika");
        assert_eq!(a.annotation.length_of_term_found, 4);
        assert_eq!(a.annotation.wikidata_item_code, "Q202864");
        assert_eq!(a.annotation.dictionary_name, "viruses");
        assert!(a.item.is_none() && a.annotation.item.is_none());
    }

    #[test]
    fn no_matches_yields_empty_chain() {
        let dicts = vec![dict("d", &["absent"])];
        let text = "nothing here";
        assert!(build_anchor_points(text, find_all_matches(&dicts, text), "now").is_empty());
    }
}
