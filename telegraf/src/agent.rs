use std::{fmt, iter, sync::Arc};

use tracing::{debug, error, trace};

use crate::{
    builder::{AgentBuilder, BuildError},
    destination::{Connection, Destination},
    error::Error,
    filter::{BeforeSend, ErrorSink, SendContext},
    point::{Point, Tags, Text, Value},
    serializer,
};

/// Writes points to a Telegraf agent.
///
/// An `Agent` holds no connection state: every write resolves the destination, opens a fresh connection, writes the
/// whole batch as a single payload, and closes the connection again. Writes block the calling thread until the payload
/// has been handed to the operating system, and are never retried.
///
/// Two flavors of every write are provided:
///
/// - `try_write*` returns any error that occurred, for callers that want to observe delivery failures.
/// - `write*` never fails: errors are logged, forwarded to the configured [`ErrorSink`], and then discarded. This is
///   the flavor instrumentation code should use.
///
/// `Agent` is `Send` and `Sync`, and is meant to be created once and shared, typically behind an `Arc`.
pub struct Agent {
    destination: Destination,
    global_tags: Tags,
    before_send: Option<Arc<dyn BeforeSend>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl Agent {
    pub(crate) fn from_parts(
        destination: Destination,
        global_tags: Tags,
        before_send: Option<Arc<dyn BeforeSend>>,
        error_sink: Option<Arc<dyn ErrorSink>>,
    ) -> Self {
        Agent { destination, global_tags, before_send, error_sink }
    }

    /// Creates an `Agent` writing to the given destination, with no global tags, filter, or error sink.
    ///
    /// # Errors
    ///
    /// If the destination cannot be parsed, an error will be returned.
    pub fn new<A>(destination: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        Ok(AgentBuilder::default().with_destination(destination)?.build())
    }

    /// Creates an [`AgentBuilder`].
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Destination this agent writes to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Tags merged into every point written by this agent.
    pub fn global_tags(&self) -> &Tags {
        &self.global_tags
    }

    /// Writes a single point.
    ///
    /// Errors are logged and forwarded to the error sink, but never returned.
    pub fn write<S, T, TK, TV, V, VK, VV>(&self, series: S, tags: T, values: V)
    where
        S: Into<Text>,
        T: IntoIterator<Item = (TK, TV)>,
        TK: Into<Text>,
        TV: Into<Value>,
        V: IntoIterator<Item = (VK, VV)>,
        VK: Into<Text>,
        VV: Into<Value>,
    {
        self.write_points(iter::once(Point::from_parts(series, tags, values)));
    }

    /// Writes a batch of points.
    ///
    /// Errors are logged and forwarded to the error sink, but never returned.
    pub fn write_points<I>(&self, points: I)
    where
        I: IntoIterator<Item = Point>,
    {
        self.write_points_with_context(points, &SendContext::default());
    }

    /// Writes a batch of points, passing `context` to the filter.
    ///
    /// Errors are logged and forwarded to the error sink, but never returned.
    pub fn write_points_with_context<I>(&self, points: I, context: &SendContext)
    where
        I: IntoIterator<Item = Point>,
    {
        if let Err(e) = self.try_write_points_with_context(points, context) {
            self.report(&e);
        }
    }

    /// Writes a single point.
    ///
    /// # Errors
    ///
    /// If the destination scheme is not supported, or the point could not be delivered, an error will be returned.
    pub fn try_write<S, T, TK, TV, V, VK, VV>(&self, series: S, tags: T, values: V) -> Result<(), Error>
    where
        S: Into<Text>,
        T: IntoIterator<Item = (TK, TV)>,
        TK: Into<Text>,
        TV: Into<Value>,
        V: IntoIterator<Item = (VK, VV)>,
        VK: Into<Text>,
        VV: Into<Value>,
    {
        self.try_write_points(iter::once(Point::from_parts(series, tags, values)))
    }

    /// Writes a batch of points.
    ///
    /// # Errors
    ///
    /// If the destination scheme is not supported, or the batch could not be delivered, an error will be returned.
    pub fn try_write_points<I>(&self, points: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Point>,
    {
        self.try_write_points_with_context(points, &SendContext::default())
    }

    /// Writes a batch of points, passing `context` to the filter.
    ///
    /// Global tags are merged into each point first, with the global value winning when a point carries a tag of the
    /// same key. The filter then sees the whole batch. If the filter vetoes the send, or nothing in the batch survives
    /// serialization, no connection is opened.
    ///
    /// # Errors
    ///
    /// If the destination scheme is not supported, or the batch could not be delivered, an error will be returned.
    pub fn try_write_points_with_context<I>(&self, points: I, context: &SendContext) -> Result<(), Error>
    where
        I: IntoIterator<Item = Point>,
    {
        let batch = points.into_iter().map(|point| self.apply_global_tags(point)).collect::<Vec<_>>();

        let batch = match &self.before_send {
            Some(before_send) => match before_send.before_send(batch, context) {
                Some(batch) => batch,
                None => {
                    debug!(destination = %self.destination, "Filter vetoed send.");
                    return Ok(());
                }
            },
            None => batch,
        };

        let payload = serializer::encode_all(&batch);
        if payload.is_empty() {
            trace!(destination = %self.destination, points = batch.len(), "Nothing to send.");
            return Ok(());
        }

        let transport = self.destination.transport_kind()?;
        let mut connection = Connection::open(&self.destination, transport)?;
        connection.send(payload.as_bytes()).map_err(|e| Error::transport(&self.destination, e))?;

        debug!(
            destination = %self.destination,
            transport = transport.transport_id(),
            points = batch.len(),
            bytes = payload.len(),
            "Wrote points."
        );

        Ok(())
    }

    fn apply_global_tags(&self, mut point: Point) -> Point {
        let tags = point.tags_mut();
        for (key, value) in &self.global_tags {
            tags.insert(key.clone(), value.clone());
        }
        point
    }

    fn report(&self, e: &Error) {
        error!(error = %e, destination = %self.destination, "Failed to write points.");

        if let Some(error_sink) = &self.error_sink {
            error_sink.report(e);
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("destination", &self.destination)
            .field("global_tags", &self.global_tags)
            .field("before_send", &self.before_send.is_some())
            .field("error_sink", &self.error_sink.is_some())
            .finish()
    }
}
