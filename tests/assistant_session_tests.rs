use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;

use consult_live::assistant::messages::{AssistantEventMessage, RealtimeInputMessage};
use consult_live::assistant::{AssistantChunk, AssistantLink, ConversationalSession};
use consult_live::error::ServiceError;

/// Scripted link that records the order of opens, closes and inputs.
#[derive(Default)]
struct ScriptedAssistant {
    events_tx: Mutex<Option<mpsc::Sender<AssistantEventMessage>>>,
    inputs: Mutex<Vec<RealtimeInputMessage>>,
    log: Mutex<Vec<&'static str>>,
}

impl ScriptedAssistant {
    async fn emit(&self, event: AssistantEventMessage) {
        let tx = self.events_tx.lock().unwrap().clone();
        tx.expect("session not open").send(event).await.unwrap();
    }

    fn inputs(&self) -> Vec<RealtimeInputMessage> {
        self.inputs.lock().unwrap().clone()
    }

    fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantLink for ScriptedAssistant {
    async fn open(&self) -> Result<mpsc::Receiver<AssistantEventMessage>, ServiceError> {
        self.log.lock().unwrap().push("open");
        let (tx, rx) = mpsc::channel(64);
        *self.events_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn send(&self, input: RealtimeInputMessage) -> Result<(), ServiceError> {
        self.inputs.lock().unwrap().push(input);
        Ok(())
    }

    async fn close(&self) {
        self.log.lock().unwrap().push("close");
        self.events_tx.lock().unwrap().take();
    }
}

fn session_with(link: &Arc<ScriptedAssistant>) -> ConversationalSession {
    ConversationalSession::new(Arc::clone(link) as Arc<dyn AssistantLink>)
}

fn capture_chunks() -> (
    Arc<Mutex<Vec<AssistantChunk>>>,
    Arc<dyn Fn(AssistantChunk) + Send + Sync>,
) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let callback: Arc<dyn Fn(AssistantChunk) + Send + Sync> =
        Arc::new(move |chunk| sink.lock().unwrap().push(chunk));
    (captured, callback)
}

#[tokio::test]
async fn test_first_chunk_of_each_turn_flagged() {
    let link = Arc::new(ScriptedAssistant::default());
    let session = session_with(&link);

    let (captured, on_chunk) = capture_chunks();
    session.start_session(on_chunk, None).await.unwrap();

    link.emit(AssistantEventMessage::Chunk {
        text: "Sounds".to_string(),
    })
    .await;
    link.emit(AssistantEventMessage::Chunk {
        text: " viral".to_string(),
    })
    .await;
    link.emit(AssistantEventMessage::TurnComplete).await;
    link.emit(AssistantEventMessage::Chunk {
        text: "Next turn".to_string(),
    })
    .await;
    sleep(Duration::from_millis(50)).await;

    let flags: Vec<bool> = captured
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.is_new_turn)
        .collect();
    assert_eq!(flags, vec![true, false, true]);

    session.end_session().await;
}

#[tokio::test]
async fn test_restart_closes_previous_session_first() {
    let link = Arc::new(ScriptedAssistant::default());
    let session = session_with(&link);

    let (captured, on_chunk) = capture_chunks();
    session
        .start_session(Arc::clone(&on_chunk), None)
        .await
        .unwrap();
    session.start_session(on_chunk, None).await.unwrap();

    assert_eq!(link.log(), vec!["open", "close", "open"]);
    assert!(session.is_active());

    // The restarted session opens a fresh turn
    link.emit(AssistantEventMessage::Chunk {
        text: "New session".to_string(),
    })
    .await;
    sleep(Duration::from_millis(50)).await;
    {
        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert!(captured[0].is_new_turn);
    }

    session.end_session().await;
    assert_eq!(link.log(), vec!["open", "close", "open", "close"]);
}

#[tokio::test]
async fn test_close_pending_blocks_text_until_turn_completes() {
    let link = Arc::new(ScriptedAssistant::default());
    let session = session_with(&link);

    let (_, on_chunk) = capture_chunks();
    session.start_session(on_chunk, None).await.unwrap();
    assert!(session.can_accept_text_input());

    session.finish_turn().await;
    assert!(session.is_active());
    assert!(!session.can_accept_text_input());

    // Text is refused while the close is pending; audio still flows
    session.send_text("late transcript").await;
    session.send_audio(&[0, 0]).await;
    let inputs = link.inputs();
    assert!(inputs.contains(&RealtimeInputMessage::AudioStreamEnd));
    assert!(!inputs
        .iter()
        .any(|i| matches!(i, RealtimeInputMessage::Text { .. })));
    assert!(inputs
        .iter()
        .any(|i| matches!(i, RealtimeInputMessage::Audio { .. })));

    link.emit(AssistantEventMessage::TurnComplete).await;
    sleep(Duration::from_millis(50)).await;

    assert!(!session.is_active());
    assert_eq!(link.log(), vec!["open", "close"]);
}

#[tokio::test]
async fn test_repeated_finish_turn_sends_one_marker() {
    let link = Arc::new(ScriptedAssistant::default());
    let session = session_with(&link);

    let (_, on_chunk) = capture_chunks();
    session.start_session(on_chunk, None).await.unwrap();

    session.finish_turn().await;
    session.finish_turn().await;

    let markers = link
        .inputs()
        .iter()
        .filter(|i| matches!(i, RealtimeInputMessage::AudioStreamEnd))
        .count();
    assert_eq!(markers, 1);

    session.end_session().await;
}

#[tokio::test]
async fn test_inputs_before_start_are_no_ops() {
    let link = Arc::new(ScriptedAssistant::default());
    let session = session_with(&link);

    session.send_audio(&[1, 2, 3, 4]).await;
    session.send_text("hello").await;
    session.send_image("bm90IGEganBlZw==").await;
    session.finish_turn().await;

    assert!(link.inputs().is_empty());
    assert!(link.log().is_empty());
}

#[tokio::test]
async fn test_end_session_is_idempotent() {
    let link = Arc::new(ScriptedAssistant::default());
    let session = session_with(&link);

    let (_, on_chunk) = capture_chunks();
    session.start_session(on_chunk, None).await.unwrap();

    session.end_session().await;
    session.end_session().await;

    assert_eq!(link.log(), vec!["open", "close"]);
    assert!(!session.is_active());
}
