pub mod chat_session;
pub mod inbound;
pub mod notification;
pub mod order;
pub mod otp;
pub mod scheduled_message;
pub mod user;
