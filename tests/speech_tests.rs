// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

use base64::Engine as _;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley::error::ParleyError;
use parley::speech::{
    AudioClip, AudioInput, CachedSynthesizer, DashScopeSynthesizer, DashScopeTranscriber,
    Synthesizer, Transcriber,
};

const TTS_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";
const ASR_PATH: &str = "/api/v1/services/audio/asr";

fn synthesizer(server: &MockServer) -> DashScopeSynthesizer {
    DashScopeSynthesizer::new(
        &server.uri(),
        Some("sk-test".to_string()),
        "qwen3-tts-flash",
        "Cherry",
        "Chinese",
    )
}

#[tokio::test]
async fn test_synthesis_inline_audio() {
    let server = MockServer::start().await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"ID3-audio");
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"audio": {"data": encoded}, "audio_format": "mp3"}
        })))
        .mount(&server)
        .await;

    let clip = synthesizer(&server).synthesize("你好").await.unwrap();
    assert_eq!(
        clip,
        AudioClip::Bytes {
            mime: "audio/mpeg".to_string(),
            data: b"ID3-audio".to_vec()
        }
    );

    let requests = server.received_requests().await.unwrap_or_default();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["input"]["text"], "你好");
    assert_eq!(body["input"]["voice"], "Cherry");
}

#[tokio::test]
async fn test_synthesis_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let err = synthesizer(&server).synthesize("x").await.unwrap_err();
    match err {
        ParleyError::Speech(message) => assert_eq!(message, "invalid key"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_synthesis_requires_key() {
    let tts = DashScopeSynthesizer::new("http://localhost:9", None, "m", "v", "l");
    assert!(matches!(
        tts.synthesize("x").await,
        Err(ParleyError::Config(_))
    ));
}

#[test]
fn test_cached_synthesis_requests_once() {
    tokio_test::block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {"audio": {"url": "https://cdn.example.com/a.wav"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cached = CachedSynthesizer::new(synthesizer(&server));
        let first = cached.synthesize("同一句").await.unwrap();
        let second = cached.synthesize("同一句").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, AudioClip::Url("https://cdn.example.com/a.wav".to_string()));
    });
}

#[tokio::test]
async fn test_transcription_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ASR_PATH))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"sentence": "我头疼"}
        })))
        .mount(&server)
        .await;

    let asr = DashScopeTranscriber::new(
        &format!("{}/", server.uri()),
        Some("sk-test".to_string()),
        "paraformer-realtime-v2",
        "zh",
        16000,
    );
    let text = asr
        .transcribe(&AudioInput::new(b"RIFF".to_vec(), "wav"))
        .await
        .unwrap();
    assert_eq!(text, "我头疼");

    let requests = server.received_requests().await.unwrap_or_default();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["model"], "paraformer-realtime-v2");
    assert_eq!(body["input"]["audio"], "UklGRg==");
    assert_eq!(body["parameters"]["format"], "wav");
}

#[tokio::test]
async fn test_transcription_without_text_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ASR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": {}})))
        .mount(&server)
        .await;

    let asr = DashScopeTranscriber::new(&server.uri(), Some("k".to_string()), "m", "zh", 16000);
    let err = asr
        .transcribe(&AudioInput::new(vec![1, 2, 3], "webm"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Decode(_)));
}
