use std::{
    borrow::{Borrow, Cow},
    fmt,
};

use indexmap::IndexMap;

/// Tags attached to a [`Point`].
pub type Tags = IndexMap<Text, Value>;

/// Values (fields) attached to a [`Point`].
pub type Values = IndexMap<Text, Value>;

/// A piece of text handed over by the application.
///
/// `Text` holds raw bytes rather than a `str` so that data read from the outside world, such as request paths or job
/// class names, can be passed along without validating it first. Byte sequences that are not valid UTF-8 are
/// deleted when the text is serialized.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Text(Cow<'static, [u8]>);

impl Text {
    /// Creates a [`Text`] from a static string.
    pub const fn from_static(s: &'static str) -> Self {
        Text(Cow::Borrowed(s.as_bytes()))
    }

    /// Returns the raw bytes of this text.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if this text holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<[u8]> for Text {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&String::from_utf8_lossy(&self.0), f)
    }
}

impl From<&'static str> for Text {
    fn from(s: &'static str) -> Self {
        Text::from_static(s)
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text(Cow::Owned(s.into_bytes()))
    }
}

impl From<Cow<'static, str>> for Text {
    fn from(s: Cow<'static, str>) -> Self {
        match s {
            Cow::Borrowed(s) => Text::from_static(s),
            Cow::Owned(s) => Text::from(s),
        }
    }
}

impl From<&'static [u8]> for Text {
    fn from(b: &'static [u8]) -> Self {
        Text(Cow::Borrowed(b))
    }
}

impl From<Vec<u8>> for Text {
    fn from(b: Vec<u8>) -> Self {
        Text(Cow::Owned(b))
    }
}

/// A tag or field value.
///
/// Any scalar can be a value, and so can the absence of one: [`Value::Nil`] entries are skipped when the point is
/// serialized, which lets callers build maps from optional data without filtering it first.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value.
    Nil,

    /// A signed integer.
    Integer(i64),

    /// An unsigned integer.
    UnsignedInteger(u64),

    /// A floating-point number.
    Float(f64),

    /// A boolean.
    Boolean(bool),

    /// A string.
    String(Text),
}

macro_rules! impl_from_integer {
    ($variant:ident, $target:ty => $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

impl_from_integer!(Integer, i64 => i8, i16, i32, i64, u8, u16, u32);
impl_from_integer!(UnsignedInteger, u64 => u64);

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UnsignedInteger(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&'static str> for Value {
    fn from(v: &'static str) -> Self {
        Value::String(Text::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Text::from(v))
    }
}

impl From<Text> for Value {
    fn from(v: Text) -> Self {
        Value::String(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// A single measurement.
///
/// A point is made of a series name, a set of tags that describe where the measurement came from, and a set of values
/// holding the measurement itself. A point with no values that survive serialization is dropped entirely.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Point {
    series: Text,
    tags: Tags,
    values: Values,
    timestamp: Option<i64>,
}

impl Point {
    /// Creates an empty [`Point`] for the given series.
    pub fn new<S>(series: S) -> Self
    where
        S: Into<Text>,
    {
        Point { series: series.into(), ..Default::default() }
    }

    /// Creates a [`Point`] from a series name, tags, and values.
    pub fn from_parts<S, T, TK, TV, V, VK, VV>(series: S, tags: T, values: V) -> Self
    where
        S: Into<Text>,
        T: IntoIterator<Item = (TK, TV)>,
        TK: Into<Text>,
        TV: Into<Value>,
        V: IntoIterator<Item = (VK, VV)>,
        VK: Into<Text>,
        VV: Into<Value>,
    {
        Point::new(series).with_tags(tags).with_values(values)
    }

    /// Adds a tag, replacing any existing tag with the same key.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Text>,
        V: Into<Value>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds multiple tags.
    #[must_use]
    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Text>,
        V: Into<Value>,
    {
        self.tags.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds a value, replacing any existing value with the same key.
    #[must_use]
    pub fn with_value<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Text>,
        V: Into<Value>,
    {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Adds multiple values.
    #[must_use]
    pub fn with_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Text>,
        V: Into<Value>,
    {
        self.values.extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the timestamp of the point.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Series name.
    pub fn series(&self) -> &Text {
        &self.series
    }

    /// Tags of this point.
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Mutable access to the tags of this point.
    pub fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }

    /// Values of this point.
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Mutable access to the values of this point.
    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    /// Timestamp of this point, if one was set.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Looks up a tag by key.
    pub fn tag(&self, key: &str) -> Option<&Value> {
        self.tags.get(key.as_bytes())
    }

    /// Looks up a value by key.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::{Point, Text, Value};

    #[test]
    fn value_conversions() {
        let cases = [
            (Value::from(6u8), Value::Integer(6)),
            (Value::from(-6i32), Value::Integer(-6)),
            (Value::from(u64::MAX), Value::UnsignedInteger(u64::MAX)),
            (Value::from(2.5f32), Value::Float(2.5)),
            (Value::from(true), Value::Boolean(true)),
            (Value::from("yes"), Value::String(Text::from("yes"))),
            (Value::from(String::from("yes")), Value::String(Text::from("yes"))),
            (Value::from(None::<i64>), Value::Nil),
            (Value::from(Some(1.5)), Value::Float(1.5)),
        ];

        for (actual, expected) in cases {
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn later_entries_replace_earlier_ones() {
        let point = Point::new("series")
            .with_tags([("app", "no"), ("field", "yes")])
            .with_tag("app", "test")
            .with_value("a", 1)
            .with_value("a", 2);

        assert_eq!(point.tags().len(), 2);
        assert_eq!(point.tag("app"), Some(&Value::from("test")));
        assert_eq!(point.value("a"), Some(&Value::Integer(2)));
        assert_eq!(point.timestamp(), None);
    }

    #[test]
    fn text_keeps_invalid_bytes() {
        let text = Text::from(b"series\xC9".to_vec());
        assert_eq!(text.as_bytes(), b"series\xC9");
        assert!(!text.is_empty());
        assert!(Text::default().is_empty());
    }
}
