use std::{fmt, iter, sync::Arc};

use quanta::{Clock, Instant};
use tracing::debug;

use crate::{
    agent::Agent,
    filter::{BeforeSend, SendContext},
    point::{Point, Tags, Text, Value, Values},
};

const ELAPSED_VALUE: Text = Text::from_static("app_ms");
const ERRORS_TAG: Text = Text::from_static("errors");

/// A named source of measurements sharing an [`Agent`].
///
/// An instrument fixes the series name and a set of default tags for everything it records, and may carry its own
/// filter that runs before the agent's. It is the building block for request and job instrumentation: a middleware or
/// job wrapper holds one `Instrument`, and calls [`start`](Instrument::start) around each unit of work.
///
/// Recording goes through the non-failing write path of the agent, so instrumented code is never affected by delivery
/// failures.
pub struct Instrument {
    agent: Arc<Agent>,
    series: Text,
    tags: Tags,
    before_send: Option<Arc<dyn BeforeSend>>,
    clock: Clock,
}

impl Instrument {
    /// Creates an `Instrument` recording to `series` through the given agent.
    pub fn new<S>(agent: Arc<Agent>, series: S) -> Self
    where
        S: Into<Text>,
    {
        Instrument { agent, series: series.into(), tags: Tags::new(), before_send: None, clock: Clock::new() }
    }

    /// Adds a default tag.
    ///
    /// Tags passed when recording take precedence over default tags with the same key.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Text>,
        V: Into<Value>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds multiple default tags.
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

    /// Set a filter that runs on every point recorded by this instrument, before the agent's own filter.
    #[must_use]
    pub fn with_before_send<F>(mut self, before_send: F) -> Self
    where
        F: BeforeSend + 'static,
    {
        self.before_send = Some(Arc::new(before_send));
        self
    }

    /// Set the clock used to time units of work.
    ///
    /// Mostly useful for testing, where a mocked clock can be used.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Agent this instrument writes to.
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Series name of every point recorded by this instrument.
    pub fn series(&self) -> &Text {
        &self.series
    }

    /// Records a single point.
    pub fn record<T, TK, TV, V, VK, VV>(&self, tags: T, values: V, context: &SendContext)
    where
        T: IntoIterator<Item = (TK, TV)>,
        TK: Into<Text>,
        TV: Into<Value>,
        V: IntoIterator<Item = (VK, VV)>,
        VK: Into<Text>,
        VV: Into<Value>,
    {
        let mut merged = self.tags.clone();
        merged.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));

        let point = Point::from_parts(self.series.clone(), merged, values);
        self.send(point, context);
    }

    /// Starts timing a unit of work.
    ///
    /// The returned guard records a point when it is dropped. See [`Timing`] for details.
    pub fn start(&self) -> Timing<'_> {
        Timing {
            instrument: self,
            start: self.clock.now(),
            tags: Tags::new(),
            values: Values::new(),
            context: SendContext::new(),
            succeeded: false,
        }
    }

    fn send(&self, point: Point, context: &SendContext) {
        let batch = match &self.before_send {
            Some(before_send) => match before_send.before_send(vec![point], context) {
                Some(batch) => batch,
                None => {
                    debug!(series = ?self.series, "Instrument filter vetoed send.");
                    return;
                }
            },
            None => vec![point],
        };

        self.agent.write_points_with_context(batch, context);
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("agent", &self.agent)
            .field("series", &self.series)
            .field("tags", &self.tags)
            .field("before_send", &self.before_send.is_some())
            .finish()
    }
}

/// Times a unit of work, and records it when dropped.
///
/// Tags, values, and the send context can be filled in while the work runs. When the guard is dropped, a point is
/// recorded through the owning [`Instrument`] with two additions:
///
/// - an `app_ms` value holding the elapsed time in milliseconds, as a float
/// - an `errors` tag, `false` if [`finish`](Timing::finish) was called and `true` otherwise
///
/// Dropping the guard without calling `finish`, whether through an early return via `?` or a panic unwinding through
/// the caller, therefore marks the unit of work as failed. An `errors` tag set explicitly through
/// [`tags_mut`](Timing::tags_mut) is left untouched.
#[must_use = "dropping the guard immediately records a failed unit of work"]
pub struct Timing<'a> {
    instrument: &'a Instrument,
    start: Instant,
    tags: Tags,
    values: Values,
    context: SendContext,
    succeeded: bool,
}

impl Timing<'_> {
    /// Tags recorded along with the timing.
    pub fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }

    /// Values recorded along with the timing.
    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    /// Context passed to the filters when the timing is recorded.
    pub fn context_mut(&mut self) -> &mut SendContext {
        &mut self.context
    }

    /// Marks the unit of work as successful, and records it.
    pub fn finish(mut self) {
        self.succeeded = true;
    }
}

impl Drop for Timing<'_> {
    fn drop(&mut self) {
        let elapsed = self.instrument.clock.now().duration_since(self.start);
        let elapsed_ms = elapsed.as_nanos() as f64 / 1_000_000.0;

        let mut tags = std::mem::take(&mut self.tags);
        tags.entry(ERRORS_TAG).or_insert(Value::Boolean(!self.succeeded));

        let values = std::mem::take(&mut self.values);
        let values = values.into_iter().chain(iter::once((ELAPSED_VALUE, Value::Float(elapsed_ms))));

        self.instrument.record(tags, values, &self.context);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use quanta::Clock;

    use super::Instrument;
    use crate::{
        agent::Agent,
        filter::SendContext,
        point::{Point, Tags, Value},
        serializer,
    };

    // Agent whose filter captures every batch and vetoes the send, so nothing touches the network.
    fn capturing_agent() -> (Arc<Agent>, Arc<Mutex<Vec<Point>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let filter_captured = Arc::clone(&captured);

        let agent = Agent::builder()
            .with_global_tag("app", "test")
            .with_before_send(move |batch: Vec<Point>, _context: &SendContext| -> Option<Vec<Point>> {
                filter_captured.lock().unwrap().extend(batch);
                None
            })
            .build();

        (Arc::new(agent), captured)
    }

    #[test]
    fn call_tags_win_over_default_tags() {
        let (agent, captured) = capturing_agent();
        let instrument = Instrument::new(agent, "requests").with_tags([("controller", "home"), ("action", "index")]);

        instrument.record([("action", "show")], [("count", 1)], &SendContext::new());

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(serializer::encode(&captured[0]), "requests,action=show,app=test,controller=home count=1i");
    }

    #[test]
    fn instrument_filter_runs_first() {
        let (agent, captured) = capturing_agent();
        let instrument = Instrument::new(agent, "jobs").with_before_send(
            |batch: Vec<Point>, context: &SendContext| -> Option<Vec<Point>> {
                if context.get("job") == Some("HealthCheckJob") {
                    None
                } else {
                    Some(batch)
                }
            },
        );

        instrument.record(Tags::new(), [("a", 1)], &SendContext::new().with_entry("job", "HealthCheckJob"));
        assert!(captured.lock().unwrap().is_empty());

        instrument.record(Tags::new(), [("a", 1)], &SendContext::new().with_entry("job", "ReportJob"));
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[test]
    fn finished_timing() {
        let (clock, mock) = Clock::mock();
        let (agent, captured) = capturing_agent();
        let instrument = Instrument::new(agent, "requests").with_clock(clock);

        let mut timing = instrument.start();
        timing.tags_mut().insert("status".into(), Value::Integer(200));
        timing.values_mut().insert("queue_ms".into(), Value::Float(1.5));
        mock.increment(Duration::from_micros(12_500));
        timing.finish();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].tag("errors"), Some(&Value::Boolean(false)));
        assert_eq!(captured[0].tag("status"), Some(&Value::Integer(200)));
        assert_eq!(captured[0].value("app_ms"), Some(&Value::Float(12.5)));
        assert_eq!(captured[0].value("queue_ms"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn dropped_timing_records_an_error() {
        let (clock, mock) = Clock::mock();
        let (agent, captured) = capturing_agent();
        let instrument = Instrument::new(agent, "jobs").with_clock(clock);

        let run = || -> Result<(), &'static str> {
            let _timing = instrument.start();
            mock.increment(Duration::from_millis(3));
            Err("job failed")
        };
        assert!(run().is_err());

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(serializer::encode(&captured[0]), "jobs,app=test,errors=true app_ms=3.0");
    }

    #[test]
    fn explicit_errors_tag_is_kept() {
        let (agent, captured) = capturing_agent();
        let instrument = Instrument::new(agent, "jobs");

        let mut timing = instrument.start();
        timing.tags_mut().insert("errors".into(), Value::from("retried"));
        timing.finish();

        assert_eq!(captured.lock().unwrap()[0].tag("errors"), Some(&Value::from("retried")));
    }

    #[test]
    fn timing_context_reaches_the_filter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let filter_seen = Arc::clone(&seen);

        let agent = Agent::builder()
            .with_before_send(move |_batch: Vec<Point>, context: &SendContext| -> Option<Vec<Point>> {
                filter_seen.lock().unwrap().push(context.get("job").map(str::to_string));
                None
            })
            .build();
        let instrument = Instrument::new(Arc::new(agent), "jobs");

        let mut timing = instrument.start();
        timing.context_mut().insert("job", "ReportJob");
        timing.finish();

        assert_eq!(*seen.lock().unwrap(), vec![Some("ReportJob".to_string())]);
    }
}
