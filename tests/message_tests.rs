use base64::Engine;
use consult_live::assistant::messages::{
    AssistantEventMessage, AssistantOpenRequest, RealtimeInputMessage,
};
use consult_live::transcribe::messages::{
    AudioChunkMessage, TranscriberEventMessage, TranscriberOpenRequest,
};

#[test]
fn test_audio_chunk_serialization() {
    let msg = AudioChunkMessage {
        session_id: "live-test".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        final_chunk: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("live-test"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioChunkMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, "live-test");
    assert_eq!(deserialized.sequence, 0);
    assert!(!deserialized.final_chunk);
}

#[test]
fn test_audio_chunk_final_marker() {
    let msg = AudioChunkMessage {
        session_id: "live-test".to_string(),
        sequence: 42,
        pcm: String::new(), // Empty for final marker
        final_chunk: true,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));

    let deserialized: AudioChunkMessage = serde_json::from_str(&json).unwrap();
    assert!(deserialized.final_chunk);
    assert!(deserialized.pcm.is_empty());
    assert_eq!(deserialized.sequence, 42);
}

#[test]
fn test_transcriber_open_request_fields() {
    let req = TranscriberOpenRequest {
        session_id: "live-test".to_string(),
        model: "nova-3".to_string(),
        language: "en-US".to_string(),
        encoding: "linear16".to_string(),
        sample_rate: 16000,
        channels: 2,
        multichannel: true,
        interim_results: true,
        smart_format: true,
        utterance_end_ms: 1000,
    };

    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("\"multichannel\":true"));
    assert!(json.contains("\"channels\":2"));
    assert!(json.contains("\"sample_rate\":16000"));
    assert!(json.contains("\"utterance_end_ms\":1000"));
}

#[test]
fn test_transcript_event_deserialization() {
    let json = r#"{
        "type": "transcript",
        "channel_index": 1,
        "transcript": "take two tablets daily",
        "words": [
            { "word": "take", "start": 1.2, "end": 1.4 },
            { "word": "two", "start": 1.4, "end": 1.6 }
        ],
        "is_final": true,
        "start": 1.2,
        "duration": 2.1
    }"#;

    let msg: TranscriberEventMessage = serde_json::from_str(json).unwrap();
    match msg {
        TranscriberEventMessage::Transcript {
            channel_index,
            transcript,
            words,
            is_final,
            start,
            duration,
        } => {
            assert_eq!(channel_index, 1);
            assert_eq!(transcript, "take two tablets daily");
            assert_eq!(words.len(), 2);
            assert_eq!(words[0].word, "take");
            assert!(is_final);
            assert_eq!(start, Some(1.2));
            assert_eq!(duration, Some(2.1));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_transcript_event_minimal_fields() {
    // Words and timing are optional on the wire
    let json = r#"{
        "type": "transcript",
        "channel_index": 0,
        "transcript": "hello",
        "is_final": false
    }"#;

    let msg: TranscriberEventMessage = serde_json::from_str(json).unwrap();
    match msg {
        TranscriberEventMessage::Transcript {
            words,
            is_final,
            start,
            duration,
            ..
        } => {
            assert!(words.is_empty());
            assert!(!is_final);
            assert_eq!(start, None);
            assert_eq!(duration, None);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_utterance_end_deserialization() {
    let msg: TranscriberEventMessage =
        serde_json::from_str(r#"{ "type": "utterance_end", "last_word_end": 3.4 }"#).unwrap();
    assert!(matches!(
        msg,
        TranscriberEventMessage::UtteranceEnd {
            last_word_end: Some(_)
        }
    ));

    let msg: TranscriberEventMessage =
        serde_json::from_str(r#"{ "type": "utterance_end" }"#).unwrap();
    assert!(matches!(
        msg,
        TranscriberEventMessage::UtteranceEnd {
            last_word_end: None
        }
    ));
}

#[test]
fn test_realtime_input_tagging() {
    let audio = RealtimeInputMessage::Audio {
        data: base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]),
        mime_type: "audio/pcm;rate=16000".to_string(),
    };
    let json = serde_json::to_string(&audio).unwrap();
    assert!(json.contains("\"type\":\"audio\""));
    assert!(json.contains("audio/pcm;rate=16000"));

    let end = RealtimeInputMessage::AudioStreamEnd;
    let json = serde_json::to_string(&end).unwrap();
    assert_eq!(json, r#"{"type":"audio_stream_end"}"#);

    let text = RealtimeInputMessage::Text {
        text: "Device audio transcript: hello".to_string(),
    };
    let json = serde_json::to_string(&text).unwrap();
    let back: RealtimeInputMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(back, text);
}

#[test]
fn test_assistant_open_request_omits_empty_instruction() {
    let req = AssistantOpenRequest {
        session_id: "live-test".to_string(),
        model: "live-preview".to_string(),
        response_modalities: vec!["text".to_string()],
        system_instruction: None,
        start_sensitivity: "high".to_string(),
        end_sensitivity: "high".to_string(),
        prefix_padding_ms: 10,
        silence_duration_ms: 5,
    };

    let json = serde_json::to_string(&req).unwrap();
    assert!(!json.contains("system_instruction"));
    assert!(json.contains("\"prefix_padding_ms\":10"));
    assert!(json.contains("\"silence_duration_ms\":5"));
}

#[test]
fn test_assistant_event_deserialization() {
    let msg: AssistantEventMessage =
        serde_json::from_str(r#"{ "type": "chunk", "text": "Sounds like" }"#).unwrap();
    match msg {
        AssistantEventMessage::Chunk { text } => assert_eq!(text, "Sounds like"),
        other => panic!("unexpected event: {other:?}"),
    }

    let msg: AssistantEventMessage =
        serde_json::from_str(r#"{ "type": "turn_complete" }"#).unwrap();
    assert!(matches!(msg, AssistantEventMessage::TurnComplete));

    let msg: AssistantEventMessage =
        serde_json::from_str(r#"{ "type": "error", "message": "stream lost" }"#).unwrap();
    match msg {
        AssistantEventMessage::Error { message } => assert_eq!(message, "stream lost"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_subject_layout() {
    use consult_live::assistant::messages as assistant;
    use consult_live::transcribe::messages as transcribe;

    assert_eq!(transcribe::open_subject("abc"), "stt.live.open.abc");
    assert_eq!(transcribe::audio_subject("abc"), "stt.live.audio.abc");
    assert_eq!(transcribe::events_subject("abc"), "stt.live.events.abc");

    assert_eq!(assistant::open_subject("abc"), "assistant.live.open.abc");
    assert_eq!(assistant::input_subject("abc"), "assistant.live.input.abc");
    assert_eq!(assistant::events_subject("abc"), "assistant.live.events.abc");
    assert_eq!(assistant::close_subject("abc"), "assistant.live.close.abc");
}
