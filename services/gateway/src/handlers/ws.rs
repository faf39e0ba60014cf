use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    sink::{Sink, SinkExt},
    stream::{Stream, StreamExt},
};
use market_data::session::Subscription;
use std::fmt::Display;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscription = state.hub.register();
    let (sender, receiver) = socket.split();
    run_session(subscription, sender, receiver).await;
}

/// Forward mailbox messages to the peer and apply its control frames until
/// either side ends, then deregister.
async fn run_session<S, R, E>(subscription: Subscription, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            outbound = subscription.next_message() => {
                let Some(message) = outbound else {
                    if subscription.was_evicted() {
                        let _ = sender.send(Message::Close(None)).await;
                    }
                    break;
                };
                if sender
                    .send(Message::Text(message.payload.to_string().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => on_text(&subscription, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(subscriber_id = subscription.id(), error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        }
    }

    subscription.close();
}

fn on_text(subscription: &Subscription, text: &str) {
    if let Some(instrument) = subscription.handle_control(text) {
        tracing::info!(subscriber_id = subscription.id(), instrument = %instrument, "Switched instrument");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
    use market_data::backpressure::{DropPolicy, OutboundMessage};
    use market_data::hub::{BroadcastHub, HubConfig};
    use market_data::metrics::ServiceMetrics;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    type Inbound = Result<Message, String>;

    fn hub(config: HubConfig) -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(config, Arc::new(ServiceMetrics::new())))
    }

    fn socket() -> (
        (UnboundedSender<Message>, UnboundedReceiver<Message>),
        (UnboundedSender<Inbound>, UnboundedReceiver<Inbound>),
    ) {
        (mpsc::unbounded(), mpsc::unbounded())
    }

    fn payload(instrument: &str, body: &str) -> BTreeMap<String, OutboundMessage> {
        BTreeMap::from([(
            instrument.to_string(),
            OutboundMessage {
                payload: Arc::from(body),
                sequence: 1,
                queued_at: 0,
            },
        )])
    }

    #[tokio::test]
    async fn test_eviction_sends_close_frame() {
        let hub = hub(HubConfig {
            queue_capacity: 1,
            drop_policy: DropPolicy::Disconnect,
            ..HubConfig::default()
        });
        let sub = hub.register();
        let ((out_tx, mut out_rx), (_in_tx, in_rx)) = socket();

        let update = payload("BTC-USDT", r#"{"sequence":1}"#);
        hub.deliver(&hub.roster(), &update);
        let report = hub.deliver(&hub.roster(), &update);
        assert_eq!(report.evicted.len(), 1);

        run_session(sub, out_tx, in_rx).await;

        assert!(matches!(out_rx.next().await, Some(Message::Close(None))));
        assert!(out_rx.next().await.is_none());
        assert_eq!(hub.metrics().export()["subscribers_evicted"], 1);
    }

    #[tokio::test]
    async fn test_peer_close_deregisters_once() {
        let hub = hub(HubConfig::default());
        let sub = hub.register();
        let other = hub.register();
        let id = sub.id();
        let ((out_tx, mut out_rx), (in_tx, in_rx)) = socket();

        in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        run_session(sub, out_tx, in_rx).await;

        assert!(!hub.is_registered(id));
        assert!(hub.is_registered(other.id()));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(!hub.unregister(id));
        assert_eq!(hub.metrics().export()["subscribers_evicted"], 0);
        // No close frame is echoed for a peer-initiated close.
        assert!(out_rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let hub = hub(HubConfig::default());
        let sub = hub.register();
        let ((out_tx, _out_rx), (in_tx, in_rx)) = socket();

        in_tx.unbounded_send(Err("connection reset".to_string())).unwrap();
        run_session(sub, out_tx, in_rx).await;

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_control_then_forward() {
        let hub = hub(HubConfig::default());
        let sub = hub.register();
        let id = sub.id();
        let ((out_tx, mut out_rx), (in_tx, in_rx)) = socket();

        let session = tokio::spawn(run_session(sub, out_tx, in_rx));

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"instrument":"ETH-USDT"}"#.into())))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while hub.instrument_of(id).as_deref() != Some("ETH-USDT") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        hub.deliver(&hub.roster(), &payload("ETH-USDT", r#"{"sequence":7}"#));
        match out_rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), r#"{"sequence":7}"#),
            other => panic!("expected text frame, got {other:?}"),
        }

        drop(in_tx);
        session.await.unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }
}
