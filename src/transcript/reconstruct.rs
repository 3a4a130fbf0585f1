// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Rebuild a transcript from stored chat records
//!
//! Stored records mix text blocks and interactive blocks. Each record is
//! reduced block by block: consecutive text accumulates in a buffer and is
//! flushed as one message whenever a structural boundary (interactive
//! block, follow-up batch, form summary, end of record) is reached.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::Value;

use crate::followup::{extract_follow_ups, FollowUpSnapshot};
use crate::interactive::{SelectOption, DEFAULT_SELECT_DESCRIPTION};

use super::message::{select_raw_text, DisplayContent, Message, Role, UNFILLED_TEXT};

/// Title of a stored form block that has no description
pub const HISTORY_FORM_TITLE: &str = "既往病史";

/// One block of a stored record
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryBlock {
    Text(String),
    Interactive(Value),
    /// Block types this client does not render
    Other,
}

impl HistoryBlock {
    fn from_wire(block: &Value) -> Self {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => block
                .pointer("/text/content")
                .and_then(Value::as_str)
                .filter(|content| !content.is_empty())
                .map_or(HistoryBlock::Other, |content| {
                    HistoryBlock::Text(content.to_string())
                }),
            Some("interactive") => match block.get("interactive") {
                Some(payload) if !payload.is_null() => HistoryBlock::Interactive(payload.clone()),
                _ => HistoryBlock::Other,
            },
            _ => HistoryBlock::Other,
        }
    }
}

/// A chat record as stored by the service
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub role: Role,
    /// Flat text content (text blocks joined by newlines when blocks exist)
    pub content: String,
    pub blocks: Option<Vec<HistoryBlock>>,
    pub time: Option<String>,
    pub hidden: bool,
}

impl HistoryRecord {
    /// Parse one item of the records list.
    ///
    /// `position` names records that carry no id. Records with neither
    /// content nor blocks yield `None`.
    pub fn from_wire(item: &Value, position: usize) -> Option<Self> {
        let id = ["id", "dataId"]
            .iter()
            .filter_map(|key| item.get(*key).and_then(Value::as_str))
            .find(|id| !id.is_empty())
            .map_or_else(|| format!("record-{position}"), str::to_string);

        let role = item
            .get("role")
            .or_else(|| item.get("obj"))
            .and_then(Value::as_str)
            .map_or(Role::User, Role::from_wire);

        let (content, blocks) = match item.get("value") {
            Some(Value::String(text)) => (text.clone(), None),
            Some(Value::Array(items)) => {
                let blocks: Vec<HistoryBlock> = items.iter().map(HistoryBlock::from_wire).collect();
                let content = blocks
                    .iter()
                    .filter_map(|b| match b {
                        HistoryBlock::Text(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                (content, Some(blocks))
            }
            _ => (
                item.get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                None,
            ),
        };

        let has_blocks = blocks
            .as_ref()
            .is_some_and(|b| b.iter().any(|block| !matches!(block, HistoryBlock::Other)));
        if content.is_empty() && !has_blocks {
            return None;
        }

        Some(Self {
            id,
            role,
            content,
            blocks,
            time: item.get("time").and_then(Value::as_str).map(str::to_string),
            hidden: item.get("hideInUI").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Parsed timestamp, if the record has a valid one
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
    }
}

/// Parse a records list, dropping unusable items
pub fn parse_records(items: &[Value]) -> Vec<HistoryRecord> {
    items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| HistoryRecord::from_wire(item, position))
        .collect()
}

/// Oldest first; records without a usable timestamp keep their order at the front.
pub fn sort_records(records: &mut [HistoryRecord]) {
    records.sort_by_key(HistoryRecord::timestamp);
}

/// What the loaded page says about the conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub last_user_message: Option<String>,
    pub last_time: Option<String>,
}

/// Latest visible user text and latest visible timestamp of an ordered record list
pub fn summarize(records: &[HistoryRecord]) -> HistorySummary {
    HistorySummary {
        last_user_message: records
            .iter()
            .rev()
            .filter(|r| !r.hidden)
            .find(|r| r.role == Role::User && !r.content.is_empty())
            .map(|r| r.content.clone()),
        last_time: records
            .iter()
            .rev()
            .filter(|r| !r.hidden)
            .find_map(|r| r.time.clone()),
    }
}

fn cite_marker() -> Option<&'static Regex> {
    static CITE_MARKER: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    CITE_MARKER
        .get_or_init(|| Regex::new(r"\[[^\]]+\]\(CITE\)"))
        .as_ref()
        .ok()
}

/// Remove `[label](CITE)` markers and surrounding whitespace
pub fn strip_cites(text: &str) -> String {
    match cite_marker() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Parse a flat JSON object whose values are all strings, keeping key order
pub fn parse_form_content(text: &str) -> Option<Vec<(String, String)>> {
    let Value::Object(map) = serde_json::from_str::<Value>(text).ok()? else {
        return None;
    };
    if map.is_empty() {
        return None;
    }
    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(value) => Some((key, value)),
            _ => None,
        })
        .collect()
}

/// Reducer over the blocks of one record
struct RecordReducer<'a> {
    record_id: &'a str,
    role: Role,
    buffer: Vec<String>,
    messages: Vec<Message>,
}

impl<'a> RecordReducer<'a> {
    fn new(record: &'a HistoryRecord) -> Self {
        Self {
            record_id: &record.id,
            role: record.role,
            buffer: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn id(&self, kind: &str, suffix: &str) -> String {
        format!("{}-{}-{}", self.record_id, kind, suffix)
    }

    fn flush(&mut self, suffix: &str) {
        if self.buffer.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.buffer).join("\n");
        let id = self.id("text", suffix);
        self.messages.push(Message::text(id, self.role, content));
    }

    fn text(&mut self, content: &str, suffix: &str) {
        let cleaned = strip_cites(content.trim());
        if cleaned.is_empty() {
            return;
        }

        if let Some(questions) = extract_follow_ups(&cleaned) {
            self.flush(&format!("{suffix}-before"));
            let mut message = Message::follow_up(
                self.id("followup", suffix),
                FollowUpSnapshot {
                    questions,
                    answers: Vec::new(),
                },
            );
            message.raw_text.clear();
            self.messages.push(message);
            return;
        }

        if let Some(pairs) = parse_form_content(&cleaned) {
            self.flush(&format!("{suffix}-before"));
            let id = self.id("form", suffix);
            self.messages
                .push(Message::form(id, self.role, None, pairs.clone(), &pairs));
            return;
        }

        self.buffer.push(cleaned);
    }

    fn interactive(&mut self, payload: &Value, index: usize) {
        self.flush(&format!("{index}-interactive"));

        let params = payload.get("params");
        let description = params
            .and_then(|p| p.get("description"))
            .and_then(Value::as_str);

        match payload.get("type").and_then(Value::as_str) {
            Some("userSelect") => {
                let options: Vec<SelectOption> = params
                    .and_then(|p| p.get("userSelectOptions"))
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|o| serde_json::from_value(o.clone()).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                if options.is_empty() {
                    return;
                }
                let description = description.unwrap_or(DEFAULT_SELECT_DESCRIPTION);
                let selected = params
                    .and_then(|p| p.get("userSelectedVal"))
                    .and_then(Value::as_str)
                    .filter(|v| !v.is_empty());
                let id = self.id("select", &index.to_string());
                self.messages.push(Message {
                    id,
                    role: Role::Assistant,
                    display: DisplayContent::Select {
                        description: description.to_string(),
                        options,
                        selected: selected.map(str::to_string),
                    },
                    raw_text: select_raw_text(description, selected),
                    loading: false,
                    follow_up: None,
                });
            }
            Some("userInput") => {
                let fields: Vec<&Value> = params
                    .and_then(|p| p.get("inputForm"))
                    .and_then(Value::as_array)
                    .map(|items| items.iter().collect())
                    .unwrap_or_default();
                if fields.is_empty() {
                    return;
                }
                let mut shown = Vec::new();
                let mut raw = Vec::new();
                for field in fields {
                    let key = field.get("key").and_then(Value::as_str).unwrap_or_default();
                    let label = field
                        .get("label")
                        .and_then(Value::as_str)
                        .filter(|l| !l.is_empty())
                        .unwrap_or(key);
                    let value = ["value", "defaultValue"]
                        .iter()
                        .filter_map(|name| field.get(*name).and_then(Value::as_str))
                        .find(|v| !v.is_empty());
                    match value {
                        Some(value) => {
                            shown.push((label.to_string(), value.to_string()));
                            raw.push((key.to_string(), value.to_string()));
                        }
                        None => shown.push((label.to_string(), UNFILLED_TEXT.to_string())),
                    }
                }
                let title = description.unwrap_or(HISTORY_FORM_TITLE).to_string();
                let id = self.id("form", &index.to_string());
                self.messages
                    .push(Message::form(id, Role::Assistant, Some(title), shown, &raw));
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Message> {
        self.flush("tail");
        self.messages
    }
}

/// Rebuild the message list for an ordered set of records
pub fn reconstruct(records: &[HistoryRecord]) -> Vec<Message> {
    let messages: Vec<Message> = records
        .iter()
        .filter(|record| !record.hidden)
        .flat_map(|record| {
            let mut reducer = RecordReducer::new(record);
            match &record.blocks {
                Some(blocks) if !blocks.is_empty() => {
                    for (index, block) in blocks.iter().enumerate() {
                        match block {
                            HistoryBlock::Text(content) => {
                                reducer.text(content, &index.to_string())
                            }
                            HistoryBlock::Interactive(payload) => {
                                reducer.interactive(payload, index)
                            }
                            HistoryBlock::Other => {}
                        }
                    }
                }
                _ => reducer.text(&record.content, "0"),
            }
            reducer.finish()
        })
        .collect();

    tracing::debug!(
        target: "parley.transcript",
        records = records.len(),
        messages = messages.len(),
        "Reconstructed transcript"
    );
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, role: Role, content: &str) -> HistoryRecord {
        HistoryRecord {
            id: id.to_string(),
            role,
            content: content.to_string(),
            blocks: None,
            time: None,
            hidden: false,
        }
    }

    #[test]
    fn test_from_wire_flat_value() {
        let item = json!({"dataId": "d1", "obj": "AI", "value": "你好", "time": "2025-01-01T00:00:00Z"});
        let record = HistoryRecord::from_wire(&item, 0).unwrap();
        assert_eq!(record.id, "d1");
        assert_eq!(record.role, Role::Assistant);
        assert_eq!(record.content, "你好");
        assert!(record.timestamp().is_some());
    }

    #[test]
    fn test_from_wire_blocks() {
        let item = json!({
            "obj": "AI",
            "value": [
                {"type": "text", "text": {"content": "a"}},
                {"type": "tool", "tools": []},
                {"type": "text", "text": {"content": "b"}}
            ]
        });
        let record = HistoryRecord::from_wire(&item, 3).unwrap();
        assert_eq!(record.id, "record-3");
        assert_eq!(record.content, "a\nb");
        assert_eq!(record.blocks.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_from_wire_interactive_only_kept() {
        let item = json!({
            "id": "r1", "role": "assistant",
            "value": [{"type": "interactive", "interactive": {"type": "userSelect"}}]
        });
        let record = HistoryRecord::from_wire(&item, 0).unwrap();
        assert!(record.content.is_empty());
    }

    #[test]
    fn test_from_wire_empty_dropped() {
        assert!(HistoryRecord::from_wire(&json!({"id": "x", "value": ""}), 0).is_none());
        assert!(HistoryRecord::from_wire(&json!({"id": "x", "value": []}), 0).is_none());
    }

    #[test]
    fn test_sort_records_untimed_first() {
        let mut records = vec![
            HistoryRecord {
                time: Some("2025-01-02T00:00:00Z".to_string()),
                ..record("late", Role::User, "b")
            },
            record("untimed", Role::User, "x"),
            HistoryRecord {
                time: Some("2025-01-01T00:00:00Z".to_string()),
                ..record("early", Role::User, "a")
            },
        ];
        sort_records(&mut records);
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["untimed", "early", "late"]);
    }

    #[test]
    fn test_strip_cites() {
        assert_eq!(strip_cites(" 结论[1](CITE) 见上[来源](CITE) "), "结论 见上");
    }

    #[test]
    fn test_parse_form_content() {
        assert_eq!(
            parse_form_content(r#"{"b":"2","a":"1"}"#),
            Some(vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ])
        );
        assert!(parse_form_content(r#"{"a":1}"#).is_none());
        assert!(parse_form_content("{}").is_none());
        assert!(parse_form_content("[]").is_none());
    }

    #[test]
    fn test_hidden_record_skipped() {
        let mut hidden = record("h", Role::System, "secret");
        hidden.hidden = true;
        let messages = reconstruct(&[hidden, record("v", Role::User, "hi")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "v-text-tail");
    }

    #[test]
    fn test_form_content_record() {
        let messages = reconstruct(&[record("u1", Role::User, r#"{"history":"无"}"#)]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "u1-form-0");
        assert_eq!(messages[0].raw_text, "history：无");
    }

    #[test]
    fn test_follow_up_record() {
        let content = "```json\n{\"follow_up_questions\":[{\"id\":1,\"question\":\"Q1\",\"options\":[\"A\"]}]}\n```";
        let messages = reconstruct(&[record("a1", Role::Assistant, content)]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "a1-followup-0");
        assert!(messages[0].raw_text.is_empty());
        let snapshot = messages[0].follow_up.as_ref().unwrap();
        assert_eq!(snapshot.questions.len(), 1);
        assert!(snapshot.answers.is_empty());
    }

    #[test]
    fn test_blocks_reducer() {
        let item = json!({
            "id": "r9",
            "obj": "AI",
            "value": [
                {"type": "text", "text": {"content": "第一段[1](CITE)"}},
                {"type": "text", "text": {"content": "第二段"}},
                {"type": "interactive", "interactive": {
                    "type": "userSelect",
                    "params": {
                        "description": "选择科室",
                        "userSelectOptions": [{"key": "a", "value": "内科"}, {"key": "b", "value": "外科"}],
                        "userSelectedVal": "内科"
                    }
                }},
                {"type": "text", "text": {"content": "{\"name\":\"张三\"}"}},
                {"type": "text", "text": {"content": "结尾"}},
                {"type": "interactive", "interactive": {
                    "type": "userInput",
                    "params": {"inputForm": [
                        {"key": "smoke", "label": "吸烟", "defaultValue": "否"},
                        {"key": "drink", "label": "", "value": "偶尔"}
                    ]}
                }}
            ]
        });
        let record = HistoryRecord::from_wire(&item, 0).unwrap();
        let messages = reconstruct(std::slice::from_ref(&record));

        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "r9-text-2-interactive",
                "r9-select-2",
                "r9-form-3",
                "r9-text-5-interactive",
                "r9-form-5",
            ]
        );
        assert_eq!(messages[0].raw_text, "第一段\n第二段");
        assert_eq!(messages[1].raw_text, "选择科室：内科");
        assert_eq!(messages[2].raw_text, "name：张三");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[4].raw_text, "smoke：否，drink：偶尔");
        assert_eq!(
            messages[4].display,
            DisplayContent::Form {
                title: Some(HISTORY_FORM_TITLE.to_string()),
                fields: vec![
                    ("吸烟".to_string(), "否".to_string()),
                    ("drink".to_string(), "偶尔".to_string()),
                ],
            }
        );
    }

    #[test]
    fn test_unfilled_form_field_left_out_of_raw_text() {
        let item = json!({
            "id": "a2", "obj": "AI",
            "value": [{"type": "interactive", "interactive": {
                "type": "userInput",
                "params": {"description": "既往史", "inputForm": [
                    {"key": "history", "label": "病史", "value": "高血压"},
                    {"key": "note", "label": "备注", "value": "", "defaultValue": ""}
                ]}
            }}]
        });
        let record = HistoryRecord::from_wire(&item, 0).unwrap();
        let messages = reconstruct(&[record]);

        assert_eq!(messages[0].raw_text, "history：高血压");
        assert_eq!(messages[0].display_text(), "既往史\n病史：高血压\n备注：未填");
    }

    #[test]
    fn test_block_records_reconstruct_identically() {
        let items = vec![
            json!({"id": "u1", "obj": "Human", "value": "挂号", "time": "2025-01-01T00:00:01Z"}),
            json!({
                "id": "a1", "obj": "AI", "time": "2025-01-01T00:00:02Z",
                "value": [
                    {"type": "text", "text": {"content": "请选择[1](CITE)"}},
                    {"type": "interactive", "interactive": {
                        "type": "userSelect",
                        "params": {
                            "userSelectOptions": [{"key": "a", "value": "内科"}],
                            "userSelectedVal": "内科"
                        }
                    }},
                    {"type": "interactive", "interactive": {
                        "type": "userInput",
                        "params": {"inputForm": [{"key": "age", "value": "30"}]}
                    }},
                    {"type": "text", "text": {"content": "完成"}}
                ]
            }),
        ];
        let mut first = parse_records(&items);
        sort_records(&mut first);
        let mut reversed: Vec<Value> = items.clone();
        reversed.reverse();
        let mut second = parse_records(&reversed);
        sort_records(&mut second);

        let once = reconstruct(&first);
        assert_eq!(once, reconstruct(&first));
        assert_eq!(once, reconstruct(&second));
        let ids: Vec<_> = once.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["u1-text-tail", "a1-text-1-interactive", "a1-select-1", "a1-form-2", "a1-text-tail"]
        );
    }

    #[test]
    fn test_summarize_ignores_hidden_records() {
        let mut hidden = HistoryRecord {
            time: Some("2025-01-01T00:00:02Z".to_string()),
            ..record("h", Role::User, "内部指令")
        };
        hidden.hidden = true;
        let records = vec![
            HistoryRecord {
                time: Some("2025-01-01T00:00:01Z".to_string()),
                ..record("u", Role::User, "可见问题")
            },
            hidden,
        ];
        let summary = summarize(&records);
        assert_eq!(summary.last_user_message.as_deref(), Some("可见问题"));
        assert_eq!(summary.last_time.as_deref(), Some("2025-01-01T00:00:01Z"));
    }

    #[test]
    fn test_reconstruct_idempotent() {
        let records = vec![
            record("u", Role::User, "问题"),
            record("a", Role::Assistant, "回答"),
        ];
        assert_eq!(reconstruct(&records), reconstruct(&records));
    }

    #[test]
    fn test_summarize() {
        let records = vec![
            HistoryRecord {
                time: Some("2025-01-01T00:00:00Z".to_string()),
                ..record("u", Role::User, "问题")
            },
            record("a", Role::Assistant, "回答"),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.last_user_message.as_deref(), Some("问题"));
        assert_eq!(summary.last_time.as_deref(), Some("2025-01-01T00:00:00Z"));
    }
}
