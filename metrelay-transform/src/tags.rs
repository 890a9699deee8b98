//! Splitting of dogstatsd-style tags off metric keys.

use indexmap::IndexMap;

/// Separates the metric name from its tags in a raw metric key.
pub const TAG_SEPARATOR: char = '#';

/// Ordered mapping of tag keys to tag values.
pub type Tags = IndexMap<String, String>;

/// A metric name with the tags that were attached to its raw key.
///
/// Raw keys have the form `name#key1:value1,key2:value2`. Everything after the first `#` is
/// treated as the tag list.
///
/// ```
/// use metrelay_transform::TaggedName;
///
/// let tagged = TaggedName::parse("my_counter#env:prod,broken,a:b:c");
/// assert_eq!(tagged.name, "my_counter");
/// assert_eq!(tagged.tags.len(), 1);
/// assert_eq!(tagged.tags["env"], "prod");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaggedName<'a> {
    /// The metric name without tags.
    pub name: &'a str,
    /// Tags in the order they appeared in the key.
    pub tags: Tags,
}

impl<'a> TaggedName<'a> {
    /// Parses a raw metric key.
    ///
    /// Tag fragments that do not contain exactly one `:` are dropped without an error.
    pub fn parse(raw: &'a str) -> Self {
        let Some((name, tag_list)) = raw.split_once(TAG_SEPARATOR) else {
            return Self {
                name: raw,
                tags: Tags::new(),
            };
        };

        Self {
            name,
            tags: parse_tags(tag_list),
        }
    }
}

fn parse_tags(string: &str) -> Tags {
    let mut tags = Tags::new();

    for fragment in string.split(',') {
        let mut parts = fragment.split(':');
        if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
            tags.insert(key.to_owned(), value.to_owned());
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged() {
        let tagged = TaggedName::parse("myapp.redis.my_counter");
        assert_eq!(tagged.name, "myapp.redis.my_counter");
        assert!(tagged.tags.is_empty());
    }

    #[test]
    fn test_tag_order_preserved() {
        let tagged = TaggedName::parse("my_counter#z:1,a:2,m:3");
        let keys: Vec<_> = tagged.tags.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_malformed_fragments_dropped() {
        let tagged = TaggedName::parse("my_counter#novalue,a:b:c,,ok:yes");
        insta::assert_debug_snapshot!(tagged, @r###"
        TaggedName {
            name: "my_counter",
            tags: {
                "ok": "yes",
            },
        }
        "###);
    }

    #[test]
    fn test_split_on_first_separator() {
        let tagged = TaggedName::parse("name#a:b#c");
        assert_eq!(tagged.name, "name");
        assert_eq!(tagged.tags["a"], "b#c");
    }

    #[test]
    fn test_empty_tag_list() {
        let tagged = TaggedName::parse("name#");
        assert_eq!(tagged.name, "name");
        assert!(tagged.tags.is_empty());
    }

    #[test]
    fn test_empty_key_and_value_kept() {
        let tagged = TaggedName::parse("name#:");
        assert_eq!(tagged.tags[""], "");
    }
}
