use std::{sync::Arc, thread, time::Duration};

use telegraf::{Agent, Instrument, Point, SendContext};

fn main() {
    tracing_subscriber::fmt::init();

    let agent = Agent::builder()
        .with_global_tag("app", "telegraf_udp")
        .with_before_send(|batch: Vec<Point>, context: &SendContext| -> Option<Vec<Point>> {
            // Health checks are too noisy to be worth recording.
            if context.get("path") == Some("/health") {
                None
            } else {
                Some(batch)
            }
        })
        .build();
    let agent = Arc::new(agent);

    agent.write("startup", [("host", "localhost")], [("value", 1)]);

    let instrument = Instrument::new(Arc::clone(&agent), "requests").with_tag("controller", "home");
    for path in ["/", "/health", "/about"] {
        let mut timing = instrument.start();
        timing.context_mut().insert("path", path);
        timing.tags_mut().insert("path".into(), path.into());

        thread::sleep(Duration::from_millis(25));
        timing.finish();
    }
}
