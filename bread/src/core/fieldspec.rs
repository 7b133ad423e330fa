//! `__`-separated field paths such as `other__text`.

/// Token joining the segments of a field spec.
pub const SEPARATOR: &str = "__";

/// Split a spec into its first segment and the remainder.
///
/// A spec that both starts and ends with the separator (`__str__`) is one
/// atomic segment, so magic method names can be addressed.
pub fn split_head(spec: &str) -> (&str, Option<&str>) {
    if is_atomic(spec) {
        return (spec, None);
    }
    match spec.split_once(SEPARATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (spec, None),
    }
}

fn is_atomic(spec: &str) -> bool {
    spec.starts_with(SEPARATOR) && spec.ends_with(SEPARATOR)
}

/// Iterator over the segments of a spec, in traversal order.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Segments<'a> {
    /// `(segment, remainder after it)`
    type Item = (&'a str, Option<&'a str>);

    fn next(&mut self) -> Option<Self::Item> {
        let spec = self.rest.take()?;
        let (head, rest) = split_head(spec);
        self.rest = rest;
        Some((head, rest))
    }
}

pub fn segments(spec: &str) -> Segments<'_> {
    Segments { rest: Some(spec) }
}

/// Strip leading `-` signs from an ordering entry.
pub fn strip_direction(entry: &str) -> &str {
    entry.trim_start_matches('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(spec: &str) -> Vec<&str> {
        segments(spec).map(|(head, _)| head).collect()
    }

    #[test]
    fn splits_on_first_separator_only() {
        assert_eq!(split_head("other__text"), ("other", Some("text")));
        assert_eq!(split_head("a__b__c"), ("a", Some("b__c")));
        assert_eq!(split_head("name"), ("name", None));
    }

    #[test]
    fn dunder_names_are_atomic() {
        assert_eq!(split_head("__str__"), ("__str__", None));
        assert_eq!(collect("other____str__"), vec!["other", "__str__"]);
    }

    #[test]
    fn segments_report_remainder() {
        let parts: Vec<_> = segments("a__b__c").collect();
        assert_eq!(
            parts,
            vec![("a", Some("b__c")), ("b", Some("c")), ("c", None)]
        );
    }
}
