//! A client for sending measurements to a [Telegraf][telegraf] agent, in the InfluxDB [line protocol][lp].
//!
//! [telegraf]: https://www.influxdata.com/time-series-platform/telegraf/
//! [lp]: https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/
//!
//! # Usage
//!
//! Measurements are sent through an [`Agent`], which is configured once and then shared:
//!
//! ```no_run
//! # use telegraf::Agent;
//! // First, create a builder.
//! //
//! // The builder can configure where points are sent, which tags are added to every point, and which filter runs
//! // before each batch is sent.
//! let agent = Agent::builder()
//!     .with_destination("tcp://localhost:8094")
//!     .expect("failed to parse destination")
//!     .with_global_tag("app", "billing")
//!     .build();
//!
//! // Writing never fails: delivery errors are logged and then discarded, so that the application is never affected by
//! // the state of the Telegraf agent.
//! agent.write("requests", [("controller", "invoices")], [("app_ms", 12.5)]);
//!
//! // When delivery errors matter, the `try_` variants return them instead.
//! # use telegraf::Point;
//! let points = vec![
//!     Point::new("jobs").with_tag("queue", "default").with_value("count", 3),
//!     Point::new("jobs").with_tag("queue", "mailers").with_value("count", 1),
//! ];
//! if let Err(e) = agent.try_write_points(points) {
//!     eprintln!("failed to write points: {}", e);
//! }
//! ```
//!
//! # Features
//!
//! ## Transports
//!
//! Points can be sent over TCP, UDP, and Unix domain sockets in either `SOCK_STREAM` or `SOCK_DGRAM` mode. The
//! transport is selected by the scheme of the destination: `tcp`, `udp`, `unix`, or `unixgram`. The network schemes
//! accept a `4` or `6` suffix to restrict name resolution to a single address family.
//!
//! Each write opens a fresh connection, writes the whole batch as a single payload, and closes the connection again.
//! The matching Telegraf input is `socket_listener`, configured with the `influx` data format.
//!
//! ## Filtering
//!
//! A [`BeforeSend`] filter sees every batch right before it is sent, along with a caller-provided [`SendContext`]. It
//! can drop or rewrite points, or veto the send altogether.
//!
//! ## Timing units of work
//!
//! An [`Instrument`] binds a series name and a set of default tags to an agent. Its [`Timing`] guard measures a unit of
//! work, such as a request or a background job, and records the elapsed time along with whether the work completed.
//!
//! # Missing
//!
//! ## Buffering
//!
//! Points are written synchronously, on the calling thread, and are never buffered or retried.

#![deny(clippy::all)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod agent;
pub use self::agent::Agent;

mod builder;
pub use self::builder::{AgentBuilder, BuildError};

mod destination;
pub use self::destination::{Destination, Family, TransportKind, DEFAULT_DESTINATION};

mod error;
pub use self::error::Error;

mod filter;
pub use self::filter::{BeforeSend, ErrorSink, SendContext};

mod instrument;
pub use self::instrument::{Instrument, Timing};

mod point;
pub use self::point::{Point, Tags, Text, Value, Values};

pub mod serializer;
