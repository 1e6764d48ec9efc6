use serde::{Deserialize, Serialize};

use crate::models::comment::{MainComment, ReplyComment};

/// 新评论推送事件，只在频道中传输，从不落库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum FanOutEvent {
    Main(MainComment),
    Reply(ReplyComment),
}

impl FanOutEvent {
    /// Id of the comment carried by the event.
    pub fn comment_id(&self) -> &str {
        match self {
            FanOutEvent::Main(comment) => &comment.id,
            FanOutEvent::Reply(reply) => &reply.id,
        }
    }
}

/// 客户端发往服务端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { room_key: String },
    #[serde(rename_all = "camelCase")]
    Leave { room_key: String },
    Ping,
}

/// 服务端发往客户端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { connection_id: String },
    #[serde(rename = "comment:new")]
    CommentNew(FanOutEvent),
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { message: String },
}
