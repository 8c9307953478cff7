use std::{fmt, time::Duration};

use crate::feed::FeedError;

/// Where a live view's subscription currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Connecting,
    Subscribed,
    ChannelError,
    TimedOut,
    /// Retries exhausted; the view is refreshed on a fixed interval.
    Polling,
    Closed,
}

impl LiveStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LiveStatus::Connecting => "Connecting…",
            LiveStatus::Subscribed => "Live",
            LiveStatus::ChannelError => "Channel error, retrying",
            LiveStatus::TimedOut => "Timed out, retrying",
            LiveStatus::Polling => "Polling",
            LiveStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resubscription attempts after a failure before polling takes over.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    /// How long a single subscribe call may take.
    pub subscribe_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(10),
        }
    }
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Subscribe,
    /// Wait for the next change on the open subscription.
    Listen,
    /// Re-run the aggregation and push it to the view.
    Refresh,
    RetryAfter(Duration),
    PollAfter(Duration),
    Stop,
}

/// Subscription lifecycle without any I/O, so every transition can be
/// exercised directly.
#[derive(Debug)]
pub struct Machine {
    status: LiveStatus,
    retries: u32,
    has_subscribed: bool,
    policy: RetryPolicy,
}

impl Machine {
    pub fn new(policy: RetryPolicy) -> Machine {
        Machine {
            status: LiveStatus::Connecting,
            retries: 0,
            has_subscribed: false,
            policy,
        }
    }

    pub fn status(&self) -> LiveStatus {
        self.status
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn start(&mut self) -> Action {
        if self.status == LiveStatus::Closed {
            return Action::Stop;
        }
        self.status = LiveStatus::Connecting;
        Action::Subscribe
    }

    /// A reconnect refreshes at once since changes may have been missed
    /// while the subscription was down.
    pub fn on_subscribed(&mut self) -> Action {
        if self.status == LiveStatus::Closed {
            return Action::Stop;
        }
        self.status = LiveStatus::Subscribed;
        self.retries = 0;
        let reconnect = self.has_subscribed;
        self.has_subscribed = true;
        if reconnect {
            Action::Refresh
        } else {
            Action::Listen
        }
    }

    pub fn on_failure(&mut self, error: &FeedError) -> Action {
        if matches!(self.status, LiveStatus::Closed | LiveStatus::Polling) {
            return self.idle();
        }
        self.status = match error {
            FeedError::TimedOut => LiveStatus::TimedOut,
            FeedError::Channel(_) => LiveStatus::ChannelError,
        };
        if self.retries < self.policy.max_attempts {
            self.retries += 1;
            Action::RetryAfter(self.policy.retry_delay)
        } else {
            self.status = LiveStatus::Polling;
            Action::PollAfter(self.policy.poll_interval)
        }
    }

    pub fn on_retry_elapsed(&mut self) -> Action {
        match self.status {
            LiveStatus::ChannelError | LiveStatus::TimedOut => {
                self.status = LiveStatus::Connecting;
                Action::Subscribe
            }
            _ => self.idle(),
        }
    }

    pub fn on_change(&mut self) -> Action {
        match self.status {
            LiveStatus::Subscribed => Action::Refresh,
            _ => self.idle(),
        }
    }

    pub fn on_poll_tick(&mut self) -> Action {
        match self.status {
            LiveStatus::Polling => Action::Refresh,
            _ => self.idle(),
        }
    }

    /// The action that follows a completed refresh.
    pub fn idle(&self) -> Action {
        match self.status {
            LiveStatus::Subscribed => Action::Listen,
            LiveStatus::Polling => Action::PollAfter(self.policy.poll_interval),
            LiveStatus::Connecting => Action::Subscribe,
            LiveStatus::ChannelError | LiveStatus::TimedOut => {
                Action::RetryAfter(self.policy.retry_delay)
            }
            LiveStatus::Closed => Action::Stop,
        }
    }

    pub fn close(&mut self) -> Action {
        self.status = LiveStatus::Closed;
        Action::Stop
    }
}
