use crate::BotResult;
use crate::bot::PluginContext;
use crate::message::IncomingMessage;
use crate::plugins::{CommandMatch, CommandSpec, Plugin, PluginRegistry};
use async_trait::async_trait;

pub const PLUGIN_ID: &str = "menu";

/// 列出所有已注册插件的描述
pub struct MenuPlugin;

/// 按分发顺序拼接插件描述，空描述跳过
pub fn render_menu(registry: &PluginRegistry) -> String {
    let lines: Vec<&str> = registry
        .entries()
        .iter()
        .map(|e| e.spec.description.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    format!("📜 功能菜单\n{}", lines.join("\n"))
}

#[async_trait]
impl Plugin for MenuPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn command_spec(&self) -> CommandSpec {
        CommandSpec::new("🚀 输入 {菜单} => 查看全部功能", 1).pattern(r"^\s*(?:菜单|menu)\s*$")
    }

    async fn on_command(
        &self,
        ctx: &PluginContext,
        msg: &IncomingMessage,
        _matched: &CommandMatch,
    ) -> BotResult<()> {
        ctx.reply_text(msg, &render_menu(ctx.registry())).await
    }
}
