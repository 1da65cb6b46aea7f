// =============================================================================
// Notifier — abstract event fan-out for trade/equity/evolution events
// =============================================================================
//
// The core never talks to Telegram or SSE directly; it emits through this
// trait. The default implementation logs structured events via `tracing`.
// A channel-based implementation lets tests assert on emitted events without
// a real transport.
// =============================================================================

use tracing::info;

/// Events the core emits to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    TradeOpened {
        agent_id: String,
        symbol: String,
        direction: String,
        size: f64,
    },
    TradeClosed {
        agent_id: String,
        symbol: String,
        realized_pnl: f64,
        exit_reason: String,
    },
    EquityAlert {
        agent_id: String,
        total_equity: f64,
        threshold: f64,
    },
    Evolution {
        agent_id: String,
        reason: String,
    },
}

/// Abstract notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Logs every event via `tracing::info!` with structured fields. The
/// production default — nothing fans out anywhere until an external
/// collaborator subscribes to the log stream or wraps this in its own
/// transport.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::TradeOpened { agent_id, symbol, direction, size } => {
                info!(agent_id, symbol, direction, size, "trade opened");
            }
            NotificationEvent::TradeClosed { agent_id, symbol, realized_pnl, exit_reason } => {
                info!(agent_id, symbol, realized_pnl, exit_reason, "trade closed");
            }
            NotificationEvent::EquityAlert { agent_id, total_equity, threshold } => {
                info!(agent_id, total_equity, threshold, "equity alert");
            }
            NotificationEvent::Evolution { agent_id, reason } => {
                info!(agent_id, reason, "agent evolution triggered");
            }
        }
    }
}

/// Test double: pushes every emitted event onto an unbounded channel so
/// assertions can drain it after exercising the code under test.
pub struct ChannelNotifier {
    sender: tokio::sync::mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<NotificationEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: NotificationEvent) {
        // A closed receiver (test already dropped it) is not a failure here.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_notifier_does_not_panic() {
        let notifier = TracingNotifier;
        notifier.notify(NotificationEvent::TradeOpened {
            agent_id: "a1".into(),
            symbol: "BTCUSDT".into(),
            direction: "long".into(),
            size: 100.0,
        });
    }

    #[test]
    fn channel_notifier_delivers_events() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        notifier.notify(NotificationEvent::Evolution {
            agent_id: "a1".into(),
            reason: "underperformance".into(),
        });
        let event = receiver.try_recv().unwrap();
        assert_eq!(
            event,
            NotificationEvent::Evolution {
                agent_id: "a1".into(),
                reason: "underperformance".into(),
            }
        );
    }

    #[test]
    fn channel_notifier_survives_dropped_receiver() {
        let (notifier, receiver) = ChannelNotifier::new();
        drop(receiver);
        notifier.notify(NotificationEvent::EquityAlert {
            agent_id: "a1".into(),
            total_equity: 900.0,
            threshold: 1000.0,
        });
    }
}
