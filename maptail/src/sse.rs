//! Server-sent events stream for one viewer

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use maptail_core::{Event, Subscription};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// First bytes on every stream, flushes headers through buffering proxies
pub const PREAMBLE: &str = ": connected\n\n";
pub const KEEPALIVE: &str = ": keepalive\n\n";

fn frame(event: &Event) -> Bytes {
    Bytes::from(event.to_sse())
}

struct Live {
    subscription: Subscription,
    heartbeat: Option<Interval>,
}

impl Live {
    async fn next_frame(&mut self) -> Option<Bytes> {
        match self.heartbeat.as_mut() {
            Some(heartbeat) => tokio::select! {
                event = self.subscription.recv() => event.as_ref().map(frame),
                _ = heartbeat.tick() => Some(Bytes::from_static(KEEPALIVE.as_bytes())),
            },
            None => self.subscription.recv().await.as_ref().map(frame),
        }
    }
}

/// Preamble, then the replay backlog, then live events until the
/// subscription ends. Dropping the stream unregisters the viewer.
pub fn event_stream(
    mut subscription: Subscription,
    keepalive: Option<Duration>,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let mut head = vec![Bytes::from_static(PREAMBLE.as_bytes())];
    head.extend(subscription.take_replay().iter().map(frame));

    let heartbeat = keepalive.filter(|d| !d.is_zero()).map(|period| {
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat
    });

    let live = stream::unfold(
        Live {
            subscription,
            heartbeat,
        },
        |mut live| async move {
            let frame = live.next_frame().await?;
            Some((frame, live))
        },
    );

    stream::iter(head).chain(live)
}
