use std::convert::Infallible;
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use arbor_gen::FrameStream;
use arbor_persist::{ConversationTree, TurnAccumulator};
use arbor_types::RelayEvent;

/// Producer half of a turn's relay: pulls frames from the generation stream
/// and pushes relay events into the bounded channel.
///
/// The channel closes exactly once, by dropping `tx`, on every exit path:
/// graceful end, transport error, cancellation, or deadline. The deadline
/// also cancels the token so a producer blocked on a full channel cannot
/// outlive the turn.
pub async fn pump_frames(
    frames: FrameStream,
    tx: mpsc::Sender<RelayEvent>,
    cancel: CancellationToken,
    turn_timeout: Duration,
) {
    let deadline = tokio::time::timeout(turn_timeout, relay_loop(frames, &tx, &cancel)).await;
    if deadline.is_err() {
        tracing::info!("turn deadline elapsed, aborting generation stream");
        cancel.cancel();
    }
}

async fn relay_loop(
    mut frames: FrameStream,
    tx: &mpsc::Sender<RelayEvent>,
    cancel: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("turn cancelled before completion");
                return;
            }
            next = frames.next() => next,
        };

        match next {
            Some(Ok(text)) => {
                // Bounded send: a slow client throttles us here, and
                // cancellation interrupts a blocked send.
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    sent = tx.send(RelayEvent::Fragment(text)) => sent,
                };
                if sent.is_err() {
                    tracing::info!("client disconnected mid-turn");
                    return;
                }
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "generation stream failed mid-turn");
                let _ = tx
                    .send(RelayEvent::Error {
                        msg: "generation service error".to_string(),
                    })
                    .await;
                return;
            }
            None => {
                let _ = tx.send(RelayEvent::Done).await;
                return;
            }
        }
    }
}

/// Consumer half: turns relay events into the SSE response body.
///
/// Events are written in arrival order, starting with the meta event. On
/// graceful completion the assistant message is persisted before the
/// terminal `[DONE]` event, so a client that sees `[DONE]` can rely on the
/// turn being durable. Dropping the body (client disconnect) cancels the
/// producer through the token's drop guard.
pub fn sse_response(
    mut rx: mpsc::Receiver<RelayEvent>,
    cancel: CancellationToken,
    mut accumulator: TurnAccumulator,
    tree: ConversationTree,
    meta: RelayEvent,
) -> Response {
    let stream = async_stream::stream! {
        let _cancel_on_drop = cancel.drop_guard();

        yield Ok::<Event, Infallible>(Event::default().data(meta.sse_payload()));

        while let Some(event) = rx.recv().await {
            match event {
                RelayEvent::Fragment(text) => {
                    accumulator.push_fragment(&text);
                    yield Ok(Event::default().data(text));
                }
                RelayEvent::Done => {
                    if accumulator.is_empty() {
                        tracing::warn!("generation stream completed without content");
                    }
                    let assistant = accumulator.finalize();
                    let conversation_id = assistant.conversation_id.clone();
                    let user_message_id = assistant.parent.clone();
                    match tree
                        .complete_turn(&conversation_id, &user_message_id, assistant)
                        .await
                    {
                        Ok(()) => {
                            yield Ok(Event::default().data(RelayEvent::Done.sse_payload()));
                        }
                        Err(err) => {
                            // The stream is committed; the conversation stays
                            // at the user message, which is resumable.
                            tracing::error!(error = %err, %conversation_id, "failed to persist assistant message");
                            let error = RelayEvent::Error {
                                msg: "failed to persist assistant message".to_string(),
                            };
                            yield Ok(Event::default().data(error.sse_payload()));
                        }
                    }
                    break;
                }
                other @ RelayEvent::Error { .. } => {
                    yield Ok(Event::default().data(other.sse_payload()));
                    break;
                }
                other @ RelayEvent::Meta { .. } => {
                    yield Ok(Event::default().data(other.sse_payload()));
                }
            }
        }
    };

    let mut response = Sse::new(stream).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_gen::GenError;
    use futures::stream;

    fn frames_from(items: Vec<Result<String, GenError>>) -> FrameStream {
        Box::pin(stream::iter(items))
    }

    fn transport_error() -> GenError {
        GenError::Transport(tonic::Status::internal("boom"))
    }

    #[tokio::test]
    async fn test_pump_relays_fragments_then_done() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let frames = frames_from(vec![Ok("a".to_string()), Ok("b".to_string())]);

        pump_frames(frames, tx, cancel, Duration::from_secs(5)).await;

        assert_eq!(rx.recv().await, Some(RelayEvent::Fragment("a".to_string())));
        assert_eq!(rx.recv().await, Some(RelayEvent::Fragment("b".to_string())));
        assert_eq!(rx.recv().await, Some(RelayEvent::Done));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pump_relays_transport_error_in_band() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let frames = frames_from(vec![Ok("a".to_string()), Err(transport_error())]);

        pump_frames(frames, tx, cancel, Duration::from_secs(5)).await;

        assert_eq!(rx.recv().await, Some(RelayEvent::Fragment("a".to_string())));
        assert!(matches!(rx.recv().await, Some(RelayEvent::Error { .. })));
        // No Done after an error; the channel just closes.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancellation_closes_channel_exactly_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let frames: FrameStream = Box::pin(stream::pending());

        let producer = tokio::spawn(pump_frames(
            frames,
            tx,
            cancel.clone(),
            Duration::from_secs(60),
        ));

        cancel.cancel();
        // Cancellation is idempotent; racing closers must not panic.
        cancel.cancel();

        producer.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_blocked_send() {
        // Capacity 1 with no consumer: the producer blocks on its second
        // send until cancelled.
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let frames = frames_from(vec![Ok("a".to_string()), Ok("b".to_string())]);

        let producer = tokio::spawn(pump_frames(
            frames,
            tx,
            cancel.clone(),
            Duration::from_secs(60),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        producer.await.unwrap();

        drop(rx);
    }

    #[tokio::test]
    async fn test_deadline_stops_producer_and_cancels_token() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let frames: FrameStream = Box::pin(stream::pending());

        pump_frames(frames, tx, cancel.clone(), Duration::from_millis(20)).await;

        assert!(cancel.is_cancelled());
        assert_eq!(rx.recv().await, None);
    }
}
