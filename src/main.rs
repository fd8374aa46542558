use anyhow::Context;
use wxbot::adapters::console;
use wxbot::bot::Bot;
use wxbot::config::AppConfig;
use wxbot::log::{self, Level};
use wxbot::plugins::covid19::{self, Covid19Config, Covid19Plugin};
use wxbot::plugins::menu::MenuPlugin;
use wxbot::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = AppConfig::load(&config_path)
        .await
        .with_context(|| format!("加载配置 {} 失败", config_path))?;

    match Level::parse(&config.core.log_level) {
        Some(level) => log::set_level(level),
        None => warn!("未知日志级别 {}，使用 info", config.core.log_level),
    }

    let covid_config: Covid19Config = config
        .get_plugin_config(covid19::PLUGIN_ID)
        .unwrap_or_default();

    let bot = Bot::builder()
        .config(config)
        .plugin(Covid19Plugin::from_config(&covid_config))
        .plugin(MenuPlugin)
        .build()
        .context("注册插件失败")?;

    tokio::spawn(console::run(bot.sender()));

    bot.run().await.context("机器人运行失败")?;
    Ok(())
}
