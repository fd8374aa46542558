use crate::message::IncomingMessage;
use tokio::sync::mpsc;

pub mod console;

/// 适配器入口：把外部事件转成 IncomingMessage 投递给 Bot
pub type MessageSender = mpsc::Sender<IncomingMessage>;
