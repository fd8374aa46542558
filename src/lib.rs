// lib.rs
//
// ================================================================================
// wxbot - 微信机器人插件核心
//
// 架构：网关客户端 | 正则指令分发 | 插件化回复流水线
// ================================================================================

pub mod adapters;
pub mod bot;
pub mod config;
pub mod log;
pub mod message;
pub mod plugins;
pub mod robot;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// 1. Error Types (统一错误处理)
// ============================================================================

/// 框架核心错误类型
#[derive(Debug, Error)]
pub enum BotError {
    /// 网络/连接失败，本层不重试
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),

    /// 网关返回非零 code
    #[error("网关错误 (code {code}): {result}")]
    Gateway { code: i64, result: String },

    #[error("机器人身份尚未初始化")]
    NotBootstrapped,

    #[error("没有获取到数据: {0}")]
    DataUnavailable(String),

    #[error("插件 [{0}] 重复注册")]
    DuplicateRegistration(String),

    #[error("指令正则无效: {0}")]
    Pattern(#[from] regex::Error),

    #[error("调用超时 ({0:?})")]
    Timeout(Duration),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 消息队列的接收端已经停止
    #[error("消息通道已关闭")]
    Closed,
}

pub type BotResult<T> = Result<T, BotError>;

/// 给一次调用加上截止时间。超时后 future 被丢弃，
/// 网关身份只在响应完整解析后才替换，所以不会留下半更新状态。
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> BotResult<T>
where
    F: Future<Output = BotResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(BotError::Timeout(deadline)),
    }
}

// ============================================================================
// 2. Re-exports (重新导出)
// ============================================================================

pub mod prelude {
    //! 开发插件时常用的类型
    //!
    //! ```rust
    //! use wxbot::prelude::*;
    //! ```

    pub use super::bot::{Bot, BotBuilder, PluginContext};
    pub use super::config::AppConfig;
    pub use super::message::IncomingMessage;
    pub use super::plugins::{CommandMatch, CommandSpec, Plugin, PluginRegistry};
    pub use super::robot::{GatewayClient, GroupInfo, RobotIdentity};
    pub use super::{BotError, BotResult, with_deadline};

    pub use async_trait::async_trait;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_passes_through_result() {
        let res = with_deadline(Duration::from_secs(1), async { Ok::<_, BotError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[tokio::test]
    async fn deadline_expires() {
        let res: BotResult<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(BotError::Timeout(_))));
    }
}
