/// 一条入站文本消息，由适配器创建，交给分发流程消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// 原始文本
    pub raw_text: String,
    /// 发送者 wxid
    pub sender_id: String,
    /// 会话目标：群消息时为群 ID，私聊时为机器人自身
    pub target_id: String,
    pub is_group: bool,
}

impl IncomingMessage {
    pub fn private(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            raw_text: text.into(),
            sender_id: sender_id.into(),
            target_id: String::new(),
            is_group: false,
        }
    }

    pub fn group(
        group_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            raw_text: text.into(),
            sender_id: sender_id.into(),
            target_id: group_id.into(),
            is_group: true,
        }
    }

    /// 回复应当发往的 ID（群聊回群，私聊回发送者）
    pub fn reply_to(&self) -> &str {
        if self.is_group {
            &self.target_id
        } else {
            &self.sender_id
        }
    }
}

/// 发送前的文本整理：统一换行符并去掉末尾空白
pub fn format_text_message(msg: &str) -> String {
    msg.replace("\r\n", "\n").trim_end().to_string()
}
