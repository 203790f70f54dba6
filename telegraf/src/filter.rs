use std::borrow::Cow;

use indexmap::IndexMap;

use crate::{error::Error, point::Point};

/// Context handed to a [`BeforeSend`] filter alongside the batch.
///
/// Callers use it to pass along metadata the filter might need to make a decision, such as the job being run or the
/// request being served, without that metadata ending up in the points themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendContext {
    entries: IndexMap<Cow<'static, str>, String>,
}

impl SendContext {
    /// Creates an empty `SendContext`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any existing entry with the same key.
    #[must_use]
    pub fn with_entry<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<String>,
    {
        self.insert(key, value);
        self
    }

    /// Adds an entry, replacing any existing entry with the same key.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Cow<'static, str>>,
        V: Into<String>,
    {
        self.entries.insert(key.into(), value.into());
    }

    /// Looks up an entry by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns an iterator over all entries, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    /// Returns `true` if the context holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A filter run on every batch right before it is sent.
///
/// The filter receives the full batch and returns the batch to send. Individual points are dropped by leaving them out
/// of the returned batch, and points may be modified on the way through. Returning `None` vetoes the send altogether:
/// no connection is opened and nothing is written.
///
/// Any `Fn(Vec<Point>, &SendContext) -> Option<Vec<Point>>` closure can be used as a filter.
pub trait BeforeSend: Send + Sync {
    /// Filters the batch.
    fn before_send(&self, batch: Vec<Point>, context: &SendContext) -> Option<Vec<Point>>;
}

impl<F> BeforeSend for F
where
    F: Fn(Vec<Point>, &SendContext) -> Option<Vec<Point>> + Send + Sync,
{
    fn before_send(&self, batch: Vec<Point>, context: &SendContext) -> Option<Vec<Point>> {
        self(batch, context)
    }
}

/// Receives the errors swallowed by the non-failing write path of an [`Agent`](crate::Agent).
///
/// Any `Fn(&Error)` closure can be used as a sink.
pub trait ErrorSink: Send + Sync {
    /// Reports an error.
    fn report(&self, error: &Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn report(&self, error: &Error) {
        self(error);
    }
}

#[cfg(test)]
mod tests {
    use super::{BeforeSend, SendContext};
    use crate::point::Point;

    #[test]
    fn context_entries() {
        let mut context = SendContext::new().with_entry("job", "ReportJob");
        context.insert("queue", String::from("default"));
        context.insert("job", "CleanupJob");

        assert_eq!(context.get("job"), Some("CleanupJob"));
        assert_eq!(context.get("queue"), Some("default"));
        assert_eq!(context.get("missing"), None);
        assert_eq!(context.iter().collect::<Vec<_>>(), vec![("job", "CleanupJob"), ("queue", "default")]);
        assert!(SendContext::default().is_empty());
    }

    #[test]
    fn closures_are_filters() {
        let filter = |batch: Vec<Point>, context: &SendContext| -> Option<Vec<Point>> {
            if context.get("skip").is_some() {
                return None;
            }
            Some(batch.into_iter().filter(|point| point.tag("drop").is_none()).collect())
        };

        let batch = vec![
            Point::new("series").with_tag("drop", 1).with_value("a", 1),
            Point::new("series").with_tag("field", "yes").with_value("a", 1),
        ];

        let kept = filter.before_send(batch.clone(), &SendContext::new()).unwrap();
        assert_eq!(kept, batch[1..].to_vec());

        let vetoed = filter.before_send(batch, &SendContext::new().with_entry("skip", "1"));
        assert_eq!(vetoed, None);
    }
}
