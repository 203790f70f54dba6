use std::sync::Arc;

use thiserror::Error;

use crate::{
    agent::Agent,
    destination::Destination,
    filter::{BeforeSend, ErrorSink},
    point::{Tags, Text, Value},
};

/// Errors that could occur while building an agent.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the destination.
    #[error("invalid destination: {reason}")]
    InvalidDestination {
        /// Details about the parsing failure.
        reason: String,
    },
}

/// Builder for an [`Agent`].
pub struct AgentBuilder {
    destination: Destination,
    global_tags: Tags,
    before_send: Option<Arc<dyn BeforeSend>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl AgentBuilder {
    /// Set the destination to write points to.
    ///
    /// The destination is a URI whose scheme selects the transport: `unix` and `unixgram` for Unix domain sockets in
    /// stream or datagram mode, `tcp` for TCP, and `udp` for UDP. Network schemes may be suffixed with `4` or `6` to
    /// only resolve addresses of that family.
    ///
    /// Only the syntax of the destination is checked here. An unknown scheme is reported when writing.
    ///
    /// Defaults to [`DEFAULT_DESTINATION`](crate::DEFAULT_DESTINATION), `udp://localhost:8094`.
    ///
    /// # Errors
    ///
    /// If the given destination is not able to be parsed, an error will be returned indicating the reason.
    pub fn with_destination<A>(mut self, destination: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.destination = destination
            .as_ref()
            .parse::<Destination>()
            .map_err(|e| BuildError::InvalidDestination { reason: e.to_string() })?;
        Ok(self)
    }

    /// Adds a global tag.
    ///
    /// Global tags are merged into every point written by the agent. When a point already carries a tag with the same
    /// key, the global tag replaces it.
    #[must_use]
    pub fn with_global_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Text>,
        V: Into<Value>,
    {
        self.global_tags.insert(key.into(), value.into());
        self
    }

    /// Adds multiple global tags.
    ///
    /// See [`with_global_tag`](AgentBuilder::with_global_tag) for details.
    #[must_use]
    pub fn with_global_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Text>,
        V: Into<Value>,
    {
        self.global_tags.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the filter to run on every batch before it is sent.
    ///
    /// See [`BeforeSend`] for details.
    #[must_use]
    pub fn with_before_send<F>(mut self, before_send: F) -> Self
    where
        F: BeforeSend + 'static,
    {
        self.before_send = Some(Arc::new(before_send));
        self
    }

    /// Set the sink receiving errors from the non-failing write path.
    ///
    /// Errors are always logged, whether or not a sink is configured.
    #[must_use]
    pub fn with_error_sink<S>(mut self, error_sink: S) -> Self
    where
        S: ErrorSink + 'static,
    {
        self.error_sink = Some(Arc::new(error_sink));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        Agent::from_parts(self.destination, self.global_tags, self.before_send, self.error_sink)
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        AgentBuilder {
            destination: Destination::default(),
            global_tags: Tags::new(),
            before_send: None,
            error_sink: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentBuilder, BuildError};
    use crate::{point::Value, DEFAULT_DESTINATION};

    #[test]
    fn defaults() {
        let agent = AgentBuilder::default().build();
        assert_eq!(agent.destination().to_string(), DEFAULT_DESTINATION);
        assert!(agent.global_tags().is_empty());
    }

    #[test]
    fn invalid_destination() {
        match AgentBuilder::default().with_destination("udp://localhost:http") {
            Err(BuildError::InvalidDestination { reason }) => assert_eq!(reason, "invalid port number"),
            Ok(_) => panic!("destination should not parse"),
        }
    }

    #[test]
    fn global_tags_accumulate() {
        let agent = AgentBuilder::default()
            .with_global_tag("app", "test")
            .with_global_tags([("tagged", "yes"), ("app", "other")])
            .build();

        assert_eq!(agent.global_tags().len(), 2);
        assert_eq!(agent.global_tags().get("app".as_bytes()), Some(&Value::from("other")));
    }
}
