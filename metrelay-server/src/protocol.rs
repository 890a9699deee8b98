//! The statsd line protocol.
//!
//! ```text
//! <name>:<value>|<type>[|@<sample_rate>][|#<tag>:<value>,...]
//! ```
//!
//! Supported types are `c` (counter), `g` (gauge), `ms`, `h` and `d` (timer), and `s` (set).
//! Gauge values with a leading `+` or `-` are applied as a delta to the current value. Tags are
//! folded into the key as `<name>#<tags>`, the form the transform expects.

use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use metrelay_transform::TAG_SEPARATOR;

/// An error returned by [`StatsdLine::parse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse statsd line")]
pub struct ParseStatsdError(());

/// A line of a datagram that could not be parsed, yielded by [`StatsdLine::parse_all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse statsd line")]
pub struct InvalidLine<'a> {
    line: &'a [u8],
}

impl<'a> InvalidLine<'a> {
    /// Returns the raw bytes of the rejected line, without its line terminator.
    pub fn line(&self) -> &'a [u8] {
        self.line
    }
}

/// The type of a statsd metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Summed up over the flush interval.
    Counter,
    /// Keeps the last reported value.
    Gauge,
    /// Collects samples and reports their statistics.
    Timer,
    /// Counts unique values.
    Set,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Counter => "c",
            Self::Gauge => "g",
            Self::Timer => "ms",
            Self::Set => "s",
        })
    }
}

impl FromStr for MetricType {
    type Err = ParseStatsdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "c" => Self::Counter,
            "g" => Self::Gauge,
            "ms" | "h" | "d" => Self::Timer,
            "s" => Self::Set,
            _ => return Err(ParseStatsdError(())),
        })
    }
}

/// The value of a single statsd line.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// Added to the counter.
    Counter(f64),
    /// Replaces the gauge value.
    Gauge(f64),
    /// Added to the gauge value.
    GaugeDelta(f64),
    /// A single timing sample.
    Timer(f64),
    /// A member of a set.
    Set(String),
}

impl MetricValue {
    /// Returns the type of this value.
    pub fn ty(&self) -> MetricType {
        match self {
            Self::Counter(_) => MetricType::Counter,
            Self::Gauge(_) | Self::GaugeDelta(_) => MetricType::Gauge,
            Self::Timer(_) => MetricType::Timer,
            Self::Set(_) => MetricType::Set,
        }
    }
}

/// A single parsed statsd line.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsdLine {
    /// The metric key, including folded tags.
    pub key: String,
    /// The parsed value.
    pub value: MetricValue,
    /// The client side sample rate in `(0, 1]`.
    pub sample_rate: f64,
}

fn parse_number(string: &str) -> Option<f64> {
    string.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_value(string: &str, ty: MetricType) -> Option<MetricValue> {
    Some(match ty {
        MetricType::Counter => MetricValue::Counter(parse_number(string)?),
        MetricType::Timer => MetricValue::Timer(parse_number(string)?),
        MetricType::Gauge if string.starts_with(['+', '-']) => {
            MetricValue::GaugeDelta(parse_number(string)?)
        }
        MetricType::Gauge => MetricValue::Gauge(parse_number(string)?),
        MetricType::Set => MetricValue::Set(string.to_owned()),
    })
}

fn parse_sample_rate(string: &str) -> Option<f64> {
    parse_number(string).filter(|rate| *rate > 0.0 && *rate <= 1.0)
}

impl StatsdLine {
    fn parse_str(string: &str) -> Option<Self> {
        let mut components = string.split('|');

        // Keys may already carry tags with colons, so the value follows the last colon.
        let (name, value) = components.next()?.rsplit_once(':')?;
        let name = name.trim();
        if name.is_empty() || value.is_empty() {
            return None;
        }

        let ty = components.next()?.trim().parse().ok()?;
        let value = parse_value(value.trim(), ty)?;

        let mut sample_rate = 1.0;
        let mut tags = None;
        for component in components {
            if let Some(rate) = component.strip_prefix('@') {
                sample_rate = parse_sample_rate(rate)?;
            } else if let Some(list) = component.strip_prefix('#') {
                tags = Some(list);
            }
        }

        let key = match tags {
            Some(list) if !list.is_empty() && !name.contains(TAG_SEPARATOR) => {
                format!("{name}{TAG_SEPARATOR}{list}")
            }
            _ => name.to_owned(),
        };

        Some(Self {
            key,
            value,
            sample_rate,
        })
    }

    /// Parses a single statsd line.
    ///
    /// # Example
    ///
    /// ```
    /// use metrelay_server::{MetricValue, StatsdLine};
    ///
    /// let line = StatsdLine::parse(b"myapp.redis.hits:3|c|@0.5|#env:prod").unwrap();
    /// assert_eq!(line.key, "myapp.redis.hits#env:prod");
    /// assert_eq!(line.value, MetricValue::Counter(3.0));
    /// assert_eq!(line.sample_rate, 0.5);
    /// ```
    pub fn parse(slice: &[u8]) -> Result<Self, ParseStatsdError> {
        let string = std::str::from_utf8(slice).or(Err(ParseStatsdError(())))?;
        Self::parse_str(string).ok_or(ParseStatsdError(()))
    }

    /// Parses all lines of a datagram.
    ///
    /// Returns a result for each line in `slice`, ignoring empty lines. Both UNIX newlines (`\n`)
    /// and Windows newlines (`\r\n`) are supported. It is possible to continue consuming the
    /// iterator after `Err` is yielded.
    pub fn parse_all(slice: &[u8]) -> ParseLines<'_> {
        ParseLines { slice }
    }
}

/// Iterator over parsed lines returned from [`StatsdLine::parse_all`].
#[derive(Clone, Debug, Default)]
pub struct ParseLines<'a> {
    slice: &'a [u8],
}

impl<'a> Iterator for ParseLines<'a> {
    type Item = Result<StatsdLine, InvalidLine<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.slice.is_empty() {
                return None;
            }

            let mut split = self.slice.splitn(2, |&b| b == b'\n');
            let current = split.next()?;
            self.slice = split.next().unwrap_or_default();

            let string = match std::str::from_utf8(current) {
                Ok(string) => string.strip_suffix('\r').unwrap_or(string),
                Err(_) => return Some(Err(InvalidLine { line: current })),
            };

            if !string.trim().is_empty() {
                let invalid = InvalidLine {
                    line: string.as_bytes(),
                };
                return Some(StatsdLine::parse_str(string).ok_or(invalid));
            }
        }
    }
}

impl FusedIterator for ParseLines<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter() {
        let line = StatsdLine::parse(b"foo:42|c").unwrap();
        insta::assert_debug_snapshot!(line, @r###"
        StatsdLine {
            key: "foo",
            value: Counter(
                42.0,
            ),
            sample_rate: 1.0,
        }
        "###);
    }

    #[test]
    fn test_parse_types() {
        let cases: [(&[u8], MetricValue); 6] = [
            (b"a:1.5|g", MetricValue::Gauge(1.5)),
            (b"a:+2|g", MetricValue::GaugeDelta(2.0)),
            (b"a:-2|g", MetricValue::GaugeDelta(-2.0)),
            (b"a:12|ms", MetricValue::Timer(12.0)),
            (b"a:7|h", MetricValue::Timer(7.0)),
            (b"a:user1|s", MetricValue::Set("user1".to_owned())),
        ];

        for (input, expected) in cases {
            assert_eq!(StatsdLine::parse(input).unwrap().value, expected);
        }
    }

    #[test]
    fn test_parse_tags_folded() {
        let line = StatsdLine::parse(b"hits:1|c|#t1:v1,t2:v2").unwrap();
        assert_eq!(line.key, "hits#t1:v1,t2:v2");
    }

    #[test]
    fn test_parse_tagged_name_kept() {
        let line = StatsdLine::parse(b"hits#t1:v1:5|c|#other:x").unwrap();
        assert_eq!(line.key, "hits#t1:v1");
        assert_eq!(line.value, MetricValue::Counter(5.0));
    }

    #[test]
    fn test_parse_invalid() {
        for input in [
            &b"foo"[..],
            b"foo:1",
            b":1|c",
            b"foo:|c",
            b"foo:bar|c",
            b"foo:1|x",
            b"foo:1|c|@0",
            b"foo:1|c|@2",
            b"foo:nan|g",
            b"\xff:1|c",
        ] {
            assert!(StatsdLine::parse(input).is_err(), "{input:?}");
        }
    }

    #[test]
    fn test_parse_all() {
        let data = b"a:1|c\r\n\nb:2|g\ninvalid\nc:3|ms\n";
        let results: Vec<_> = StatsdLine::parse_all(data).collect();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().key, "a");
        assert_eq!(results[1].as_ref().unwrap().key, "b");
        assert_eq!(results[2].as_ref().unwrap_err().line(), b"invalid");
        assert_eq!(results[3].as_ref().unwrap().value.ty(), MetricType::Timer);
    }

    #[test]
    fn test_parse_all_reports_rejected_line() {
        let data = b"ok:1|c\r\nbad:x|c\r\n\xff:1|c\n";
        let rejected: Vec<_> = StatsdLine::parse_all(data)
            .filter_map(Result::err)
            .map(|error| error.line().to_vec())
            .collect();

        assert_eq!(rejected, [b"bad:x|c".to_vec(), b"\xff:1|c".to_vec()]);
    }

    #[test]
    fn test_metric_type_roundtrip() {
        for ty in ["c", "g", "ms", "s"] {
            assert_eq!(ty.parse::<MetricType>().unwrap().to_string(), ty);
        }
    }
}
