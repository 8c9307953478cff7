use std::{future::Future, ops::ControlFlow, time::Duration};

use crate::{
    feed::{ChangeFeed, FeedError, FeedFilter, Subscription},
    machine::{Action, LiveStatus, Machine, RetryPolicy},
};

/// Source of delays, swapped out in tests so retries and polling do not
/// take real time.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// What the driver asks of the view it is keeping fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    Status(LiveStatus),
    Refresh,
}

/// Keeps a view subscribed to `filter` until `handler` breaks.
///
/// The handler sees every status transition and every refresh request.
/// Dropping the returned future (or breaking from the handler) cancels any
/// pending sleep and drops the subscription.
pub async fn run<F, C, H, Fut>(
    feed: &F,
    clock: &C,
    filter: &FeedFilter,
    policy: RetryPolicy,
    mut handler: H,
) -> LiveStatus
where
    F: ChangeFeed,
    C: Clock,
    H: FnMut(LiveEvent) -> Fut,
    Fut: Future<Output = ControlFlow<()>>,
{
    let mut machine = Machine::new(policy);
    let mut subscription: Option<F::Subscription> = None;
    let mut action = machine.start();
    let mut reported = None;
    // set once the handler breaks; it is not called again after that
    let mut stopped = false;

    loop {
        let status = machine.status();
        if !stopped && reported != Some(status) {
            reported = Some(status);
            tracing::debug!(table = %filter.table, value = %filter.value, %status, "live status");
            if handler(LiveEvent::Status(status)).await.is_break() {
                stopped = true;
                action = machine.close();
            }
        }

        action = match action {
            Action::Stop => break,
            Action::Subscribe => {
                subscription = None;
                let attempt = tokio::select! {
                    biased;
                    result = feed.subscribe(filter) => result,
                    _ = clock.sleep(policy.subscribe_timeout) => {
                        Err(FeedError::TimedOut)
                    }
                };
                match attempt {
                    Ok(sub) => {
                        subscription = Some(sub);
                        machine.on_subscribed()
                    }
                    Err(error) => {
                        tracing::warn!(%error, table = %filter.table, "could not subscribe to changes");
                        machine.on_failure(&error)
                    }
                }
            }
            Action::Listen => {
                let next = match subscription.as_mut() {
                    Some(sub) => sub.next().await,
                    None => None,
                };
                match next {
                    Some(Ok(_)) => machine.on_change(),
                    Some(Err(error)) => {
                        subscription = None;
                        tracing::warn!(%error, "change subscription failed");
                        machine.on_failure(&error)
                    }
                    None => {
                        subscription = None;
                        machine.on_failure(&FeedError::Channel(
                            "change feed closed".to_string(),
                        ))
                    }
                }
            }
            Action::Refresh => {
                if handler(LiveEvent::Refresh).await.is_break() {
                    stopped = true;
                    machine.close()
                } else {
                    machine.idle()
                }
            }
            Action::RetryAfter(delay) => {
                clock.sleep(delay).await;
                machine.on_retry_elapsed()
            }
            Action::PollAfter(interval) => {
                subscription = None;
                clock.sleep(interval).await;
                machine.on_poll_tick()
            }
        };
    }

    drop(subscription);
    machine.status()
}

#[cfg(test)]
mod tests {
    use std::{future::ready, sync::Mutex};

    use super::*;
    use crate::feed::{BroadcastFeed, ChangeEvent, ChangeKind};

    /// Returns immediately, remembering what it was asked to wait for.
    #[derive(Default)]
    struct InstantClock {
        slept: Mutex<Vec<Duration>>,
    }

    impl Clock for InstantClock {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    struct Silent;

    impl Subscription for Silent {
        async fn next(&mut self) -> Option<Result<ChangeEvent, FeedError>> {
            std::future::pending().await
        }
    }

    /// Refuses every subscription.
    struct RefusingFeed;

    impl ChangeFeed for RefusingFeed {
        type Subscription = Silent;

        async fn subscribe(
            &self,
            _filter: &FeedFilter,
        ) -> Result<Silent, FeedError> {
            Err(FeedError::Channel("refused".to_string()))
        }
    }

    /// Never answers a subscription request.
    struct HangingFeed;

    impl ChangeFeed for HangingFeed {
        type Subscription = Silent;

        async fn subscribe(
            &self,
            _filter: &FeedFilter,
        ) -> Result<Silent, FeedError> {
            std::future::pending().await
        }
    }

    fn vote_cast(campaign_id: i64) -> ChangeEvent {
        ChangeEvent::new("votes_single", ChangeKind::Insert)
            .with("campaign_id", campaign_id)
    }

    #[tokio::test]
    async fn each_change_triggers_one_refresh() {
        let feed = BroadcastFeed::new(16);
        let filter = FeedFilter::new("votes_single", "campaign_id", 4);
        let mut refreshes = 0;

        let status = run(
            &feed,
            &TokioClock,
            &filter,
            RetryPolicy::default(),
            |event| {
                match event {
                    LiveEvent::Status(LiveStatus::Subscribed) => {
                        feed.publish(vote_cast(9));
                        for _ in 0..3 {
                            feed.publish(vote_cast(4));
                        }
                    }
                    LiveEvent::Refresh => refreshes += 1,
                    LiveEvent::Status(_) => {}
                }
                ready(if refreshes == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            },
        )
        .await;

        assert_eq!(refreshes, 3);
        assert_eq!(status, LiveStatus::Closed);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_polling() {
        let clock = InstantClock::default();
        let filter = FeedFilter::new("votes_single", "campaign_id", 1);
        let mut statuses = Vec::new();

        run(
            &RefusingFeed,
            &clock,
            &filter,
            RetryPolicy::default(),
            |event| {
                ready(match event {
                    LiveEvent::Status(status) => {
                        statuses.push(status);
                        ControlFlow::Continue(())
                    }
                    LiveEvent::Refresh => ControlFlow::Break(()),
                })
            },
        )
        .await;

        use LiveStatus::*;
        assert_eq!(
            statuses,
            vec![
                Connecting,
                ChannelError,
                Connecting,
                ChannelError,
                Connecting,
                ChannelError,
                Connecting,
                Polling
            ]
        );
        let policy = RetryPolicy::default();
        assert_eq!(
            *clock.slept.lock().unwrap(),
            vec![
                policy.retry_delay,
                policy.retry_delay,
                policy.retry_delay,
                policy.poll_interval
            ]
        );
    }

    #[tokio::test]
    async fn handler_is_not_called_after_it_breaks() {
        let feed = BroadcastFeed::new(16);
        let filter = FeedFilter::new("votes_single", "campaign_id", 2);
        let mut events = Vec::new();

        let status = run(
            &feed,
            &TokioClock,
            &filter,
            RetryPolicy::default(),
            |event| {
                events.push(event);
                if event == LiveEvent::Status(LiveStatus::Subscribed) {
                    feed.publish(vote_cast(2));
                }
                ready(if event == LiveEvent::Refresh {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            },
        )
        .await;

        assert_eq!(status, LiveStatus::Closed);
        assert_eq!(
            events,
            vec![
                LiveEvent::Status(LiveStatus::Connecting),
                LiveEvent::Status(LiveStatus::Subscribed),
                LiveEvent::Refresh,
            ]
        );
    }

    #[tokio::test]
    async fn slow_subscriptions_time_out() {
        let clock = InstantClock::default();
        let filter = FeedFilter::new("votes_single", "campaign_id", 1);

        let status = run(
            &HangingFeed,
            &clock,
            &filter,
            RetryPolicy::default(),
            |event| {
                ready(match event {
                    LiveEvent::Status(LiveStatus::TimedOut) => {
                        ControlFlow::Break(())
                    }
                    _ => ControlFlow::Continue(()),
                })
            },
        )
        .await;

        assert_eq!(status, LiveStatus::Closed);
        assert_eq!(
            clock.slept.lock().unwrap()[0],
            RetryPolicy::default().subscribe_timeout
        );
    }
}
