// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley::chat::{
    ChatSession, FollowUpProgress, NoopTurnObserver, RecordingObserver, SendOptions, SendOutcome,
};
use parley::client::HttpBackend;
use parley::error::{ApiError, ParleyError};
use parley::interactive::{InteractiveAnswer, PromptKind};
use parley::transcript::{DisplayContent, Role};

const COMPLETIONS: &str = "/api/v1/chat/completions";

fn sse(lines: &[&str]) -> ResponseTemplate {
    let mut body = lines.join("\n");
    body.push('\n');
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream")
}

fn delta(text: &str) -> String {
    format!(
        "data: {}",
        json!({"choices": [{"delta": {"content": text}}]})
    )
}

fn session_for(server: &MockServer) -> ChatSession {
    let backend = HttpBackend::new(
        Some(format!("{}/", server.uri())),
        Some("app-1".to_string()),
        Some("secret".to_string()),
    );
    ChatSession::new(Arc::new(backend), "conv-1")
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == COMPLETIONS)
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_streamed_answer_over_http() {
    let server = MockServer::start().await;
    let hel = delta("Hel");
    let lo = delta("lo");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(sse(&[&hel, "", &lo, "", "data: [DONE]"]))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    let mut observer = RecordingObserver::default();
    let outcome = session
        .send("  hi  ", SendOptions::default(), &mut observer)
        .await
        .unwrap();

    assert_eq!(outcome, SendOutcome::Answer("Hello".to_string()));
    let fulls: Vec<&str> = observer.deltas.iter().map(|(_, f)| f.as_str()).collect();
    assert_eq!(fulls, vec!["Hel", "Hello"]);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["appId"], "app-1");
    assert_eq!(bodies[0]["chatId"], "conv-1");
    assert_eq!(bodies[0]["stream"], true);
    assert_eq!(bodies[0]["detail"], true);
    assert_eq!(bodies[0]["messages"], json!([{"role": "user", "content": "hi"}]));
}

#[tokio::test]
async fn test_server_error_body_replaces_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(403).set_body_string("app not published"))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    let err = session
        .send("hi", SendOptions::default(), &mut NoopTurnObserver)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ParleyError::Api(ApiError::ServerError { status: 403, .. })
    ));
    let last = session.transcript().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.raw_text, "app not published");
    assert!(!last.loading);
}

#[tokio::test]
async fn test_empty_stream_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    let err = session
        .send("hi", SendOptions::default(), &mut NoopTurnObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Api(ApiError::EmptyBody)));
}

#[tokio::test]
async fn test_form_prompt_resume_body() {
    let server = MockServer::start().await;
    let graph = json!({
        "nodes": [{"nodeId": "n1"}],
        "edges": [],
        "chatId": "wf-chat",
        "responseChatItemId": "item-9",
        "variables": {"dept": "内科"}
    })
    .to_string();
    let form = json!({
        "interactive": {
            "type": "userInput",
            "params": {
                "description": "请补充信息",
                "inputForm": [
                    {"key": "age", "label": "年龄", "required": true},
                    {"key": "gender", "label": "性别", "list": [{"label": "男", "value": "男"}, {"label": "女", "value": "女"}], "defaultValue": "女"}
                ]
            }
        }
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(sse(&[
            "event: workflowGraph",
            &format!("data: {graph}"),
            "",
            "event: interactive",
            &format!("data: {form}"),
            "",
            "data: [DONE]",
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    let done = delta("收到");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(sse(&[&done, "data: [DONE]"]))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    let outcome = session
        .send("挂号", SendOptions::default(), &mut NoopTurnObserver)
        .await
        .unwrap();
    let prompt = match outcome {
        SendOutcome::Interactive(prompt) => prompt,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(prompt.kind, PromptKind::UserInput);
    assert_eq!(prompt.form_defaults(), vec![("gender".to_string(), "女".to_string())]);

    // Missing required field keeps the prompt pending without a request.
    let err = session
        .answer_interactive(
            InteractiveAnswer::Form(Vec::new()),
            SendOptions::default(),
            &mut NoopTurnObserver,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Precondition(_)));
    assert!(session.pending_prompt().is_some());
    assert_eq!(request_bodies(&server).await.len(), 1);

    let outcome = session
        .answer_interactive(
            InteractiveAnswer::Form(vec![("age".to_string(), "30".to_string())]),
            SendOptions::default(),
            &mut NoopTurnObserver,
        )
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Answer("收到".to_string()));

    let bodies = request_bodies(&server).await;
    let resume = &bodies[1];
    assert_eq!(resume["chatId"], "wf-chat");
    assert_eq!(resume["responseChatItemId"], "item-9");
    assert_eq!(resume["variables"], json!({"dept": "内科"}));
    assert_eq!(resume["nodes"], json!([{"nodeId": "n1"}]));
    let detail = &resume["messages"][0];
    assert_eq!(detail["hideInUI"], false);
    assert_eq!(detail["role"], "user");
    assert!(detail["dataId"].as_str().is_some_and(|id| !id.is_empty()));
    let content: Value = serde_json::from_str(detail["content"].as_str().unwrap()).unwrap();
    assert_eq!(content, json!({"age": "30", "gender": "女"}));
    assert_eq!(
        resume["interactive"]["userInputForm"],
        json!({"age": "30", "gender": "女"})
    );

    let log = &session.messages()[1];
    assert_eq!(log.raw_text, "age：30，gender：女");
    assert!(matches!(log.display, DisplayContent::Form { .. }));
}

#[tokio::test]
async fn test_explicit_response_item_id_wins() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(sse(&[
            "event: flowResponses",
            "data: {\"responseChatItemId\":\"captured\"}",
            "",
            "event: interactive",
            "data: {\"type\":\"userSelect\",\"params\":{\"userSelectOptions\":[{\"key\":\"k\",\"value\":\"v\"}]}}",
            "",
            "data: [DONE]",
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    let ok = delta("ok");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(sse(&[&ok, "data: [DONE]"]))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    session
        .send("go", SendOptions::default(), &mut NoopTurnObserver)
        .await
        .unwrap();
    session
        .answer_interactive(
            InteractiveAnswer::Select("v".to_string()),
            SendOptions::default().with_response_chat_item_id("explicit"),
            &mut NoopTurnObserver,
        )
        .await
        .unwrap();

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[1]["responseChatItemId"], "explicit");
    assert_eq!(bodies[1]["chatId"], "conv-1");
    assert_eq!(bodies[1]["interactive"]["userSelect"], json!({"key": "k", "value": "v"}));
}

#[tokio::test]
async fn test_follow_up_batch_over_http() {
    let server = MockServer::start().await;
    let batch = delta(
        "```json\n{\"follow_up_questions\":[{\"id\":1,\"question\":\"持续多久？\",\"options\":[\"一天\",\"一周\"]}]}\n```",
    );
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(sse(&[&batch, "data: [DONE]"]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    let reply = delta("建议就医");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(sse(&[&reply, "data: [DONE]"]))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    let mut observer = RecordingObserver::default();
    let outcome = session
        .send("咳嗽", SendOptions::default(), &mut observer)
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::FollowUps { count: 1 });
    assert!(observer.deltas.is_empty());
    assert_eq!(session.follow_ups().unwrap().total(), 1);

    let progress = session
        .answer_follow_up("一周", SendOptions::default(), &mut NoopTurnObserver)
        .await
        .unwrap();
    assert_eq!(
        progress,
        FollowUpProgress::Submitted(SendOutcome::Answer("建议就医".to_string()))
    );

    let bodies = request_bodies(&server).await;
    assert_eq!(
        bodies[1]["messages"],
        json!([{"role": "user", "content": "追问回答：\n1. 一周"}])
    );
}

#[tokio::test]
async fn test_history_load_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/core/chat/getRecords_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"list": [
                {"dataId": "u1", "obj": "Human", "value": "头疼", "time": "2025-03-01T08:00:00Z"},
                {"dataId": "s1", "obj": "System", "value": "prompt", "hideInUI": true},
                {"dataId": "a1", "obj": "AI", "value": [
                    {"type": "text", "text": {"content": "您好[1](CITE)"}},
                    {"type": "interactive", "interactive": {"type": "userSelect", "params": {
                        "description": "持续时间",
                        "userSelectOptions": [{"key": "a", "value": "一天"}, {"key": "b", "value": "一周"}],
                        "userSelectedVal": "一周"
                    }}}
                ], "time": "2025-03-01T08:00:05Z"}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/core/chat/history/batchDelete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200})))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    let summary = session.load_history().await.unwrap();
    assert_eq!(summary.last_user_message.as_deref(), Some("头疼"));
    assert_eq!(summary.last_time.as_deref(), Some("2025-03-01T08:00:05Z"));

    let ids: Vec<&str> = session.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["u1-text-tail", "a1-text-1-interactive", "a1-select-1"]);
    assert_eq!(session.messages()[1].raw_text, "您好");
    assert_eq!(session.messages()[2].raw_text, "持续时间：一周");

    let records_body = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .find(|r| r.url.path() == "/api/core/chat/getRecords_v2")
        .map(|r| r.body_json::<Value>().unwrap())
        .unwrap();
    assert_eq!(records_body["chatId"], "conv-1");
    assert_eq!(records_body["pageSize"], 10);

    let rotated = session
        .delete_conversations(&["conv-1".to_string()])
        .await
        .unwrap();
    assert!(rotated.is_some());
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn test_unconfigured_backend_sends_nothing() {
    let backend = HttpBackend::new(None, None, None);
    let mut session = ChatSession::new(Arc::new(backend), "conv-1");
    let err = session
        .send("hi", SendOptions::default(), &mut NoopTurnObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Config(_)));
    assert!(session.messages().is_empty());
}
