use crate::adapters::MessageSender;
use crate::message::IncomingMessage;
use crate::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

/// 控制台模拟的发送者
pub const CONSOLE_SENDER: &str = "console";

/// 解析一行输入：`@群ID 内容` 模拟群消息，其余视为私聊
pub fn parse_line(line: &str) -> Option<IncomingMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix('@')
        && let Some((group_id, text)) = rest.split_once(char::is_whitespace)
        && !group_id.is_empty()
    {
        return Some(IncomingMessage::group(
            group_id,
            CONSOLE_SENDER,
            text.trim_start(),
        ));
    }

    Some(IncomingMessage::private(CONSOLE_SENDER, line))
}

/// 控制台适配器：逐行读取标准输入，直到 EOF 或 Bot 停止接收
pub async fn run(sender: MessageSender) {
    info!(target: "Console", "已启动控制台模式。请输入指令 (例如: 济南疫情, @123@chatroom 菜单)");

    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(target: "Console", "读取输入失败: {}", e);
                break;
            }
        };

        let Some(msg) = parse_line(&line) else {
            continue;
        };
        if sender.send(msg).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_private_messages() {
        let msg = parse_line("  济南疫情 ").unwrap();
        assert!(!msg.is_group);
        assert_eq!(msg.raw_text, "济南疫情");
        assert_eq!(msg.reply_to(), CONSOLE_SENDER);
    }

    #[test]
    fn at_prefix_targets_a_group() {
        let msg = parse_line("@123@chatroom 全国疫情").unwrap();
        assert!(msg.is_group);
        assert_eq!(msg.target_id, "123@chatroom");
        assert_eq!(msg.raw_text, "全国疫情");
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_line("   ").is_none());
    }
}
