//! Helpers for rendering points in the InfluxDB [line protocol].
//!
//! Serialization never fails. Malformed data is dropped at the finest granularity possible: a field or tag whose key
//! or value sanitizes to nothing is skipped, and a point is only dropped when its series is empty or none of its values
//! survive.
//!
//! [line protocol]: https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/

use crate::point::{Point, Text, Value};

const SERIES_ESCAPES: &[char] = &[' ', ','];
const TAG_ESCAPES: &[char] = &[' ', ',', '='];
const FIELD_KEY_ESCAPES: &[char] = &[' ', ',', '=', '"'];
const FIELD_VALUE_ESCAPES: &[char] = &['\\', '"'];

struct ValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl ValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn write_field(&mut self, buf: &mut String, value: &Value) -> bool {
        match value {
            Value::Nil => return false,
            Value::Integer(v) => {
                buf.push_str(self.int_writer.format(*v));
                buf.push('i');
            }
            Value::UnsignedInteger(v) => {
                buf.push_str(self.int_writer.format(*v));
                buf.push('i');
            }
            Value::Float(v) => {
                if !v.is_finite() {
                    return false;
                }
                buf.push_str(self.float_writer.format_finite(*v));
            }
            Value::Boolean(v) => write_quoted(buf, bool_bytes(*v)),
            Value::String(v) => write_quoted(buf, v.as_bytes()),
        }

        true
    }

    fn write_tag_value(&mut self, buf: &mut String, value: &Value) {
        match value {
            Value::Nil => {}
            Value::Integer(v) => buf.push_str(self.int_writer.format(*v)),
            Value::UnsignedInteger(v) => buf.push_str(self.int_writer.format(*v)),
            Value::Float(v) if v.is_nan() => buf.push_str("NaN"),
            Value::Float(v) if v.is_infinite() => {
                buf.push_str(if v.is_sign_positive() { "Infinity" } else { "-Infinity" });
            }
            Value::Float(v) => buf.push_str(self.float_writer.format_finite(*v)),
            Value::Boolean(v) => write_escaped(buf, bool_bytes(*v), TAG_ESCAPES),
            Value::String(v) => write_escaped(buf, v.as_bytes(), TAG_ESCAPES),
        }
    }
}

/// Encodes a single point as a line, without a trailing newline.
///
/// Returns an empty string if the point is dropped.
pub fn encode(point: &Point) -> String {
    let mut buf = String::new();
    if !write_point(&mut buf, point) {
        buf.clear();
    }
    buf
}

/// Encodes multiple points, one line per point.
///
/// Dropped points do not leave empty lines behind, and the output has no trailing newline.
pub fn encode_all<'a, I>(points: I) -> String
where
    I: IntoIterator<Item = &'a Point>,
{
    let mut buf = String::new();
    for point in points {
        let start = buf.len();
        if start != 0 {
            buf.push('\n');
        }

        if !write_point(&mut buf, point) {
            buf.truncate(start);
        }
    }
    buf
}

/// Appends the line for `point` to `buf`.
///
/// Returns `false` if the point was dropped, in which case `buf` may hold a partial line that the caller must discard.
fn write_point(buf: &mut String, point: &Point) -> bool {
    let mut formatter = ValueFormatter::new();

    let series_start = buf.len();
    write_escaped(buf, point.series().as_bytes(), SERIES_ESCAPES);
    if buf.len() == series_start {
        return false;
    }

    let mut fields = point
        .values()
        .iter()
        .filter_map(|(key, value)| render_field(&mut formatter, key, value))
        .collect::<Vec<_>>();
    if fields.is_empty() {
        return false;
    }

    let mut tags = point
        .tags()
        .iter()
        .filter_map(|(key, value)| render_tag(&mut formatter, key, value))
        .collect::<Vec<_>>();

    // Ordering is decided on the rendered text, not on the raw keys.
    tags.sort_unstable();
    fields.sort_unstable();

    for tag in &tags {
        buf.push(',');
        buf.push_str(tag);
    }

    buf.push(' ');
    for (i, field) in fields.iter().enumerate() {
        if i != 0 {
            buf.push(',');
        }
        buf.push_str(field);
    }

    if let Some(timestamp) = point.timestamp() {
        buf.push(' ');
        buf.push_str(formatter.int_writer.format(timestamp));
    }

    true
}

fn render_field(formatter: &mut ValueFormatter, key: &Text, value: &Value) -> Option<String> {
    let mut field = String::new();
    write_escaped(&mut field, key.as_bytes(), FIELD_KEY_ESCAPES);
    if field.is_empty() {
        return None;
    }

    field.push('=');
    formatter.write_field(&mut field, value).then_some(field)
}

fn render_tag(formatter: &mut ValueFormatter, key: &Text, value: &Value) -> Option<String> {
    let mut tag = String::new();
    write_escaped(&mut tag, key.as_bytes(), TAG_ESCAPES);
    if tag.is_empty() {
        return None;
    }

    tag.push('=');
    let value_start = tag.len();
    formatter.write_tag_value(&mut tag, value);
    (tag.len() != value_start).then_some(tag)
}

fn bool_bytes(value: bool) -> &'static [u8] {
    if value {
        b"true"
    } else {
        b"false"
    }
}

fn write_quoted(buf: &mut String, raw: &[u8]) {
    buf.push('"');
    write_escaped(buf, raw, FIELD_VALUE_ESCAPES);
    buf.push('"');
}

/// Writes `raw` into `buf`, deleting invalid UTF-8, collapsing runs of tabs and line breaks into a single space, and
/// escaping every character in `escapes` with a backslash.
fn write_escaped(buf: &mut String, raw: &[u8], escapes: &[char]) {
    let mut in_break = false;
    for chunk in raw.utf8_chunks() {
        for c in chunk.valid().chars() {
            if matches!(c, '\t' | '\r' | '\n') {
                if !in_break {
                    in_break = true;
                    push_escaped(buf, ' ', escapes);
                }
                continue;
            }

            in_break = false;
            push_escaped(buf, c, escapes);
        }
    }
}

fn push_escaped(buf: &mut String, c: char, escapes: &[char]) {
    if escapes.contains(&c) {
        buf.push('\\');
    }
    buf.push(c);
}
