use crate::bot::PluginContext;
use crate::message::IncomingMessage;
use crate::plugins::{CommandMatch, CommandSpec, Plugin};
use crate::{BotResult, error, with_deadline};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod source;
pub mod template;

use source::{BaiduOpenData, DEFAULT_API, EpidemicSource};
use template::{days_since_outbreak, duration_line, render_national, render_region};

pub const PLUGIN_ID: &str = "covid19";

/// 过长的消息不可能是 "XX疫情" 指令
const MAX_INPUT_BYTES: usize = 3 * 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Covid19Config {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api")]
    pub api: String,
}

fn default_true() -> bool {
    true
}

fn default_api() -> String {
    DEFAULT_API.to_string()
}

impl Default for Covid19Config {
    fn default() -> Self {
        Self {
            enabled: true,
            api: default_api(),
        }
    }
}

pub struct Covid19Plugin {
    source: Arc<dyn EpidemicSource>,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Covid19Plugin {
    pub fn new<S: EpidemicSource + 'static>(source: S) -> Self {
        Self {
            source: Arc::new(source),
            clock: local_now,
        }
    }

    pub fn from_config(config: &Covid19Config) -> Self {
        Self::new(BaiduOpenData::new(config.api.clone()))
    }

    /// 替换时钟（测试用固定时间）
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// 查询并渲染完整回复
    pub async fn build_reply(&self, region: &str, ctx: &PluginContext) -> BotResult<String> {
        let body = if !region.is_empty() && region != "全国" {
            let data = with_deadline(ctx.deadline(), self.source.fetch_region(region)).await?;
            render_region(region, &data)
        } else {
            let data = with_deadline(ctx.deadline(), self.source.fetch_national()).await?;
            render_national(&data)
        };
        let days = days_since_outbreak((self.clock)());
        Ok(duration_line(days) + &body)
    }
}

#[async_trait]
impl Plugin for Covid19Plugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn command_spec(&self) -> CommandSpec {
        CommandSpec::new("🚀 输入 {XX疫情} => 获取疫情数据，Ps:济南疫情", 99)
            .pattern(r"([^\x00-\xff]{0,6})疫情(.*)")
    }

    fn accepts(&self, msg: &IncomingMessage) -> bool {
        msg.raw_text.len() <= MAX_INPUT_BYTES
    }

    async fn on_command(
        &self,
        ctx: &PluginContext,
        msg: &IncomingMessage,
        matched: &CommandMatch,
    ) -> BotResult<()> {
        let region = matched.group(1);

        match self.build_reply(region, ctx).await {
            Ok(reply) => ctx.reply_text(msg, &reply).await,
            Err(e) => {
                error!(target: "Covid19", "获取{}疫情数据失败: {}", region, e);
                ctx.reply_text(msg, &format!("获取{}疫情数据失败", region))
                    .await
            }
        }
    }
}
