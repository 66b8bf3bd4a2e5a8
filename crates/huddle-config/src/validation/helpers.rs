//! Range check shared by the section validators.

use std::fmt::Display;
use std::ops::RangeInclusive;

/// Record `name` as invalid unless `value` lies in `range`.
pub(crate) fn check_range<T>(errors: &mut Vec<String>, name: &str, value: T, range: RangeInclusive<T>)
where
    T: PartialOrd + Display,
{
    if !range.contains(&value) {
        errors.push(format!(
            "{name} = {value} is out of range [{}, {}]",
            range.start(),
            range.end()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let mut errors = Vec::new();
        check_range(&mut errors, "relay.port", 1024u32, 1024..=65535);
        check_range(&mut errors, "relay.port", 65535u32, 1024..=65535);
        assert!(errors.is_empty());

        check_range(&mut errors, "relay.port", 80u32, 1024..=65535);
        assert_eq!(errors, vec!["relay.port = 80 is out of range [1024, 65535]"]);
    }
}
