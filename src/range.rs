//! Page range specifications.
//!
//! A specification is either a single one-based page (`"8"`) or an inclusive
//! one-based span (`"4-6"`). Resolving it against a page count yields
//! zero-based page indices in ascending order.

use std::str::FromStr;

use failure::Fail;

#[derive(Debug, Fail, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[fail(display = "unable to parse page specification '{}'", spec)]
    MalformedSpec { spec: String },
    #[fail(display = "page {} is outside of range 1-{}", value, bound)]
    OutOfRange { value: usize, bound: usize },
    #[fail(display = "start of range {} is greater than end of range {}", start, end)]
    InvalidOrder { start: usize, end: usize },
    #[fail(display = "no pages specified")]
    NoPages,
}

/// One token of a page selection, still one-based and unchecked against a
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSpec {
    Single(usize),
    Span { start: usize, end: usize },
}

impl FromStr for PageSpec {
    type Err = RangeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let malformed = || RangeError::MalformedSpec {
            spec: token.to_string(),
        };

        let numbers = token
            .trim()
            .split('-')
            .map(|part| parse_literal(part).ok_or_else(malformed))
            .collect::<Result<Vec<_>, _>>()?;

        match numbers.as_slice() {
            [page] => Ok(PageSpec::Single(*page)),
            [start, end] => Ok(PageSpec::Span {
                start: *start,
                end: *end,
            }),
            _ => Err(malformed()),
        }
    }
}

// `usize::from_str` would also take "+5"; only bare digits are page numbers.
fn parse_literal(part: &str) -> Option<usize> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl PageSpec {
    /// Checks the spec against a document of `bound` pages and returns the
    /// zero-based indices it covers.
    pub fn indices(&self, bound: usize) -> Result<Vec<usize>, RangeError> {
        let check = |value: usize| {
            if value == 0 || value > bound {
                Err(RangeError::OutOfRange { value, bound })
            } else {
                Ok(value)
            }
        };

        match *self {
            PageSpec::Single(page) => Ok(vec![check(page)? - 1]),
            PageSpec::Span { start, end } => {
                let start = check(start)?;
                let end = check(end)?;
                if start > end {
                    return Err(RangeError::InvalidOrder { start, end });
                }
                Ok((start - 1..end).collect())
            }
        }
    }
}

/// Parses one token and resolves it against `bound` pages.
pub fn parse_range(token: &str, bound: usize) -> Result<Vec<usize>, RangeError> {
    token.parse::<PageSpec>()?.indices(bound)
}

/// Resolves every token in order and concatenates the results.
///
/// Indices are neither sorted nor deduplicated: `["1", "1", "2"]` selects
/// the first page twice, then the second.
pub fn parse_ranges<S: AsRef<str>>(tokens: &[S], bound: usize) -> Result<Vec<usize>, RangeError> {
    if tokens.is_empty() {
        return Err(RangeError::NoPages);
    }

    let mut pages = Vec::new();
    for token in tokens {
        pages.extend(parse_range(token.as_ref(), bound)?);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", 10, vec![0])]
    #[case("10", 10, vec![9])]
    #[case("4-6", 10, vec![3, 4, 5])]
    #[case("3-3", 3, vec![2])]
    #[case(" 2-3 ", 5, vec![1, 2])]
    #[case("04", 10, vec![3])]
    fn resolves_valid_specs(#[case] token: &str, #[case] bound: usize, #[case] expected: Vec<usize>) {
        assert_eq!(parse_range(token, bound), Ok(expected));
    }

    #[test]
    fn reversed_span_is_invalid_order() {
        assert_eq!(
            parse_range("5-2", 10),
            Err(RangeError::InvalidOrder { start: 5, end: 2 })
        );
    }

    #[rstest]
    #[case("11", 11)]
    #[case("0", 0)]
    #[case("3-12", 12)]
    #[case("0-4", 0)]
    fn rejects_pages_outside_document(#[case] token: &str, #[case] value: usize) {
        assert_eq!(
            parse_range(token, 10),
            Err(RangeError::OutOfRange { value, bound: 10 })
        );
    }

    #[test]
    fn bounds_are_checked_before_order() {
        assert_eq!(
            parse_range("12-2", 10),
            Err(RangeError::OutOfRange { value: 12, bound: 10 })
        );
    }

    #[rstest]
    #[case("1-2-3")]
    #[case("abc")]
    #[case("")]
    #[case("-")]
    #[case("3-")]
    #[case("+5")]
    #[case("2..4")]
    fn rejects_malformed_tokens(#[case] token: &str) {
        assert_eq!(
            parse_range(token, 10),
            Err(RangeError::MalformedSpec {
                spec: token.to_string()
            })
        );
    }

    #[test]
    fn empty_document_rejects_everything() {
        assert_eq!(
            parse_range("1", 0),
            Err(RangeError::OutOfRange { value: 1, bound: 0 })
        );
    }

    #[test]
    fn keeps_token_order_and_duplicates() {
        assert_eq!(parse_ranges(&["1", "1", "2"], 5), Ok(vec![0, 0, 1]));
        assert_eq!(parse_ranges(&["4-5", "1", "3-4"], 5), Ok(vec![3, 4, 0, 2, 3]));
    }

    #[test]
    fn first_bad_token_fails_the_whole_selection() {
        assert_eq!(
            parse_ranges(&["1", "9", "x"], 5),
            Err(RangeError::OutOfRange { value: 9, bound: 5 })
        );
    }

    #[test]
    fn empty_selection_is_rejected() {
        let tokens: [&str; 0] = [];
        assert_eq!(parse_ranges(&tokens, 5), Err(RangeError::NoPages));
    }

    proptest! {
        #[test]
        fn single_page_maps_to_its_index((bound, x) in (1usize..500).prop_flat_map(|b| (Just(b), 1..=b))) {
            prop_assert_eq!(parse_range(&x.to_string(), bound), Ok(vec![x - 1]));
        }

        #[test]
        fn span_is_contiguous_and_inclusive(
            (bound, start, end) in (1usize..500)
                .prop_flat_map(|b| (Just(b), 1..=b))
                .prop_flat_map(|(b, s)| (Just(b), Just(s), s..=b))
        ) {
            let pages = parse_range(&format!("{}-{}", start, end), bound).unwrap();
            prop_assert_eq!(pages.len(), end - start + 1);
            prop_assert_eq!(pages, (start - 1..end).collect::<Vec<_>>());
        }

        #[test]
        fn pages_past_the_end_are_out_of_range(bound in 0usize..500, extra in 1usize..100) {
            let value = bound + extra;
            prop_assert_eq!(
                parse_range(&value.to_string(), bound),
                Err(RangeError::OutOfRange { value, bound })
            );
        }
    }
}
