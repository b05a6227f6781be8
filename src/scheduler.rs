use privet_core::message::MessageSender;
use privet_core::{Message, VisibilityCounter};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Ask the controller to rediscover devices every `period`, but only while
/// some viewer is visible
pub fn start_discovery_polling(
    tx: MessageSender,
    period: Duration,
    counter: &'static VisibilityCounter,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tracing::info!("Discovery polling every {}s while visible", period.as_secs());

    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; discovery was just started
        timer.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Discovery polling cancelled");
                    break;
                }
                _ = timer.tick() => {
                    if !counter.has_any_visible() {
                        continue;
                    }
                    tracing::debug!("Refreshing discovery");
                    if tx.send(Message::Poll { force: false }).is_err() {
                        tracing::debug!("Controller stopped, ending discovery polling");
                        break;
                    }
                }
            }
        }
    })
}
