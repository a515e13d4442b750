//! Request bodies sent to the conversation endpoint and the rule that turns
//! one event payload into one text fragment.

use crate::identity::Identity;
use crate::storage::{Message, Role};
use serde::{Deserialize, Serialize};

/// Action understood by the backend as "answer this turn"
pub const ASK_ACTION: &str = "_ask";

/// Model, persona and key settings copied into every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub jailbreak: String,
    pub internet_access: bool,
    pub api_key: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            jailbreak: "default".to_string(),
            internet_access: false,
            api_key: None,
        }
    }
}

/// Body of a conversation POST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub conversation_id: String,
    pub action: String,
    pub model: String,
    pub jailbreak: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub meta: RequestMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Fresh id for this request's message
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<RequestUser>,
    pub content: RequestContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUser {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContent {
    /// Messages already in the conversation, oldest first
    pub conversation: Vec<Message>,
    pub internet_access: bool,
    pub content_type: String,
    /// The new turn
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPart {
    pub content: String,
    pub role: Role,
}

impl ConversationRequest {
    /// Build the request for one user turn
    ///
    /// `history` is the conversation as stored before `text` was added.
    ///
    /// # Examples
    ///
    /// ```
    /// use overlap::identity::Identity;
    /// use overlap::stream::{ChatOptions, ConversationRequest};
    ///
    /// let identity = Identity::new("user_1234");
    /// let request = ConversationRequest::for_turn(
    ///     "conv-1",
    ///     &ChatOptions::default(),
    ///     &identity,
    ///     Vec::new(),
    ///     "Hi",
    /// );
    /// assert_eq!(request.meta.content.parts[0].content, "Hi");
    /// ```
    pub fn for_turn(
        conversation_id: &str,
        options: &ChatOptions,
        identity: &Identity,
        history: Vec<Message>,
        text: &str,
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            action: ASK_ACTION.to_string(),
            model: options.model.clone(),
            jailbreak: options.jailbreak.clone(),
            api_key: options.api_key.clone(),
            meta: RequestMeta {
                id: new_message_id(),
                user: Some(RequestUser {
                    user_id: identity.user_id.clone(),
                    team_id: identity.team_id.clone(),
                }),
                content: RequestContent {
                    conversation: history,
                    internet_access: options.internet_access,
                    content_type: "text".to_string(),
                    parts: vec![RequestPart {
                        content: text.to_string(),
                        role: Role::User,
                    }],
                },
            },
        }
    }
}

/// Generate a sortable id for an outgoing message
pub fn new_message_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Text carried by one event payload
///
/// A payload that parses as a JSON object with a string `text` field yields
/// that field; anything else (plain text, other JSON, invalid JSON) is
/// returned unchanged.
pub fn extract_fragment(payload: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(fields)) => match fields.get("text") {
            Some(serde_json::Value::String(text)) => text.clone(),
            _ => payload.to_string(),
        },
        _ => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fragment_unwraps_text_field() {
        assert_eq!(extract_fragment(r#"{"text":"He"}"#), "He");
        assert_eq!(extract_fragment(r#"{"text":"","extra":1}"#), "");
        assert_eq!(extract_fragment(r#"{"text":"line\nbreak"}"#), "line\nbreak");
    }

    #[test]
    fn test_extract_fragment_falls_back_to_raw() {
        assert_eq!(extract_fragment("plain words"), "plain words");
        assert_eq!(extract_fragment(r#"{"text":42}"#), r#"{"text":42}"#);
        assert_eq!(extract_fragment(r#"{"other":"x"}"#), r#"{"other":"x"}"#);
        assert_eq!(extract_fragment(r#"["text"]"#), r#"["text"]"#);
        assert_eq!(extract_fragment(r#"{"text":"unterminated"#), r#"{"text":"unterminated"#);
        assert_eq!(extract_fragment("[DONE]"), "[DONE]");
    }

    #[test]
    fn test_request_wire_shape() {
        let identity = Identity::new("user_1").with_team("team-9");
        let options = ChatOptions {
            api_key: Some("k".to_string()),
            internet_access: true,
            ..ChatOptions::default()
        };
        let request = ConversationRequest::for_turn("c1", &options, &identity, Vec::new(), "Hi");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["conversation_id"], "c1");
        assert_eq!(value["action"], "_ask");
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["jailbreak"], "default");
        assert_eq!(value["api_key"], "k");
        assert_eq!(value["meta"]["user"]["user_id"], "user_1");
        assert_eq!(value["meta"]["user"]["team_id"], "team-9");
        assert_eq!(value["meta"]["content"]["internet_access"], true);
        assert_eq!(value["meta"]["content"]["content_type"], "text");
        assert_eq!(value["meta"]["content"]["parts"][0]["content"], "Hi");
        assert_eq!(value["meta"]["content"]["parts"][0]["role"], "user");
        assert!(value["meta"]["content"]["conversation"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_request_omits_unset_optionals() {
        let identity = Identity::new("user_1");
        let request = ConversationRequest::for_turn(
            "c1",
            &ChatOptions::default(),
            &identity,
            Vec::new(),
            "Hi",
        );
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("api_key").is_none());
        assert!(value["meta"]["user"].get("team_id").is_none());
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(new_message_id(), new_message_id());
    }
}
