pub mod comment;
pub mod notification;
pub mod response;
pub mod user;
pub mod websocket;
