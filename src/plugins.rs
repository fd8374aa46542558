use crate::bot::PluginContext;
use crate::message::IncomingMessage;
use crate::{BotError, BotResult, debug};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

pub mod covid19;
pub mod menu;

/// 插件声明的指令：按顺序尝试的正则、权重（越大越先）、描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub patterns: Vec<String>,
    pub weight: i32,
    pub description: String,
}

impl CommandSpec {
    pub fn new(description: impl Into<String>, weight: i32) -> Self {
        Self {
            patterns: Vec::new(),
            weight,
            description: description.into(),
        }
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }
}

/// 一次成功匹配的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    pub plugin_id: String,
    /// 命中的是插件第几条正则
    pub pattern_index: usize,
    /// 捕获组 1..，未参与匹配的组为空字符串
    pub groups: Vec<String>,
}

impl CommandMatch {
    /// 第 n 个捕获组（从 1 开始），不存在时返回空字符串
    pub fn group(&self, n: usize) -> &str {
        n.checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// 业务逻辑插件接口
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 插件唯一标识
    fn id(&self) -> &str;

    fn command_spec(&self) -> CommandSpec;

    /// 插件自己的前置过滤（例如长度限制），返回 false 时跳过该插件
    fn accepts(&self, _msg: &IncomingMessage) -> bool {
        true
    }

    async fn on_command(
        &self,
        ctx: &PluginContext,
        msg: &IncomingMessage,
        matched: &CommandMatch,
    ) -> BotResult<()>;
}

/// 已编译的注册项
pub struct CommandEntry {
    pub spec: CommandSpec,
    regexes: Vec<Regex>,
    plugin: Arc<dyn Plugin>,
}

impl CommandEntry {
    pub fn id(&self) -> &str {
        self.plugin.id()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    fn try_match(&self, text: &str) -> Option<CommandMatch> {
        let (pattern_index, groups) = match_patterns(&self.regexes, text)?;
        Some(CommandMatch {
            plugin_id: self.id().to_string(),
            pattern_index,
            groups,
        })
    }
}

/// 按顺序尝试每条正则，返回第一条命中的下标与捕获组
pub fn match_patterns(regexes: &[Regex], text: &str) -> Option<(usize, Vec<String>)> {
    regexes.iter().enumerate().find_map(|(idx, re)| {
        let caps = re.captures(text)?;
        let groups = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        Some((idx, groups))
    })
}

/// 插件注册表：启动时追加，之后只读
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<CommandEntry>,
    ids: HashSet<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec, plugin: Arc<dyn Plugin>) -> BotResult<()> {
        let id = plugin.id().to_string();
        if self.ids.contains(&id) {
            return Err(BotError::DuplicateRegistration(id));
        }

        let regexes = spec
            .patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        self.ids.insert(id);
        self.entries.push(CommandEntry {
            spec,
            regexes,
            plugin,
        });
        // 稳定排序：同权重保持注册顺序
        self.entries.sort_by_key(|e| std::cmp::Reverse(e.spec.weight));
        Ok(())
    }

    /// 按分发顺序排列的注册项
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 纯匹配：找出应处理这条消息的插件，不执行任何插件逻辑
    pub fn resolve(&self, msg: &IncomingMessage) -> Option<(&CommandEntry, CommandMatch)> {
        self.entries
            .iter()
            .filter(|e| e.plugin.accepts(msg))
            .find_map(|e| e.try_match(&msg.raw_text).map(|m| (e, m)))
    }

    /// 匹配并调用插件；没有插件命中时返回 Ok(None)
    pub async fn dispatch(
        &self,
        ctx: &PluginContext,
        msg: &IncomingMessage,
    ) -> BotResult<Option<CommandMatch>> {
        let Some((entry, matched)) = self.resolve(msg) else {
            return Ok(None);
        };

        debug!(
            target: "Plugin",
            "[{}] 命中第 {} 条指令: {:?}",
            matched.plugin_id, matched.pattern_index, matched.groups
        );
        entry.plugin.on_command(ctx, msg, &matched).await?;
        Ok(Some(matched))
    }
}
