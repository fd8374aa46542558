use crate::config::AppConfig;
use crate::message::IncomingMessage;
use crate::plugins::{Plugin, PluginRegistry};
use crate::robot::GatewayClient;
use crate::{BotError, BotResult, debug, error, info, warn, with_deadline};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

/// 插件上下文：插件访问网关与配置的唯一入口
#[derive(Clone)]
pub struct PluginContext {
    gateway: Arc<GatewayClient>,
    registry: Arc<PluginRegistry>,
    config: Arc<AppConfig>,
}

impl PluginContext {
    pub fn new(
        gateway: Arc<GatewayClient>,
        registry: Arc<PluginRegistry>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            gateway,
            registry,
            config,
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn plugin_config<T: for<'de> Deserialize<'de>>(&self, plugin_id: &str) -> Option<T> {
        self.config.get_plugin_config(plugin_id)
    }

    /// 单次外部调用的截止时间
    pub fn deadline(&self) -> Duration {
        self.config.core.deadline()
    }

    /// 回复文本到消息来源（群或私聊）
    pub async fn reply_text(&self, msg: &IncomingMessage, text: &str) -> BotResult<()> {
        with_deadline(self.deadline(), self.gateway.send_text(msg.reply_to(), text)).await
    }
}

/// 框架构建器
pub struct BotBuilder {
    config: AppConfig,
    gateway: Option<Arc<GatewayClient>>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl BotBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            gateway: None,
            plugins: Vec::new(),
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用外部构造的网关客户端（默认按配置创建）
    pub fn gateway(mut self, gateway: Arc<GatewayClient>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// 注册插件
    pub fn plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// 构建注册表；配置中 enabled = false 的插件不注册
    pub fn build(self) -> BotResult<Bot> {
        let mut registry = PluginRegistry::new();
        for plugin in self.plugins {
            if !self.config.is_plugin_enabled(plugin.id()) {
                info!(target: "Plugin", "⏸ [{}] 已禁用", plugin.id());
                continue;
            }
            registry.register(plugin.command_spec(), plugin.clone())?;
            info!(target: "Plugin", "✅ [{}] 就绪", plugin.id());
        }

        let gateway = self
            .gateway
            .unwrap_or_else(|| Arc::new(GatewayClient::new(&self.config.robot)));

        let (message_tx, message_rx) = mpsc::channel(1000);
        let permits = self.config.core.max_concurrency.max(1);

        Ok(Bot {
            inner: Arc::new(BotInner {
                ctx: PluginContext::new(gateway, Arc::new(registry), Arc::new(self.config)),
                message_tx,
                permits: Arc::new(Semaphore::new(permits)),
            }),
            message_rx: Some(message_rx),
        })
    }
}

impl Default for BotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct BotInner {
    ctx: PluginContext,
    message_tx: mpsc::Sender<IncomingMessage>,
    permits: Arc<Semaphore>,
}

pub struct Bot {
    inner: Arc<BotInner>,
    message_rx: Option<mpsc::Receiver<IncomingMessage>>,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::new()
    }

    pub fn context(&self) -> &PluginContext {
        &self.inner.ctx
    }

    /// 适配器用来投递入站消息的发送端
    pub fn sender(&self) -> mpsc::Sender<IncomingMessage> {
        self.inner.message_tx.clone()
    }

    /// 注入消息（用于测试或外部触发）
    pub async fn inject_message(&self, msg: IncomingMessage) -> BotResult<()> {
        self.inner
            .message_tx
            .send(msg)
            .await
            .map_err(|_| BotError::Closed)
    }

    /// 引导机器人身份并打印群数量；必须先于任何消息处理
    pub async fn bootstrap(&self) -> BotResult<()> {
        let ctx = &self.inner.ctx;
        with_deadline(ctx.deadline(), ctx.gateway().bootstrap_identity()).await?;

        match with_deadline(ctx.deadline(), ctx.gateway().list_groups()).await {
            Ok(groups) => info!(target: "Gateway", "已加入 {} 个群", groups.len()),
            Err(e) => warn!(target: "Gateway", "获取群列表失败: {}", e),
        }
        Ok(())
    }

    /// 启动：引导身份后消费消息，每条消息一个任务，Ctrl-C 退出
    pub async fn run(self) -> BotResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("监听退出信号失败: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// 同 `run`，但由调用方给出退出信号。
    /// 退出后最多等待一个 deadline 让在途消息处理完，超时的任务被中止。
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> BotResult<()> {
        self.bootstrap().await?;

        let mut rx = match self.message_rx.take() {
            Some(rx) => rx,
            None => return Ok(()),
        };

        info!("开始处理消息 (已注册 {} 个插件)", self.inner.ctx.registry().len());

        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();

        loop {
            reap(&mut tasks);

            // 等待并发名额时同样响应退出信号
            let permit = tokio::select! {
                _ = &mut shutdown => {
                    info!("收到退出信号");
                    break;
                }
                permit = self.inner.permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let msg = tokio::select! {
                _ = &mut shutdown => {
                    info!("收到退出信号");
                    break;
                }
                maybe_msg = rx.recv() => match maybe_msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            let inner = self.inner.clone();
            tasks.spawn(async move {
                let _permit = permit;
                inner.process(msg).await;
            });
        }

        self.drain(tasks).await;
        Ok(())
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        reap(&mut tasks);
        if tasks.is_empty() {
            return;
        }

        let deadline = self.inner.ctx.deadline();
        info!("等待 {} 条消息处理完成", tasks.len());
        let finished = tokio::time::timeout(deadline, async {
            while let Some(res) = tasks.join_next().await {
                log_join(res);
            }
        })
        .await;

        if finished.is_err() {
            warn!("{:?} 内未处理完，中止剩余 {} 条消息", deadline, tasks.len());
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    /// 同步处理一条消息（不经过队列）
    pub async fn handle(&self, msg: IncomingMessage) {
        self.inner.process(msg).await;
    }
}

/// 回收已结束的任务，避免结果在 JoinSet 中堆积
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.try_join_next() {
        log_join(res);
    }
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    match res {
        Err(e) if e.is_panic() => error!(target: "Plugin", "消息处理任务崩溃: {}", e),
        _ => {}
    }
}

impl BotInner {
    async fn process(&self, msg: IncomingMessage) {
        let ctx = &self.ctx;
        match ctx.registry().dispatch(ctx, &msg).await {
            Ok(Some(m)) => debug!(target: "Plugin", "[{}] 处理完成", m.plugin_id),
            Ok(None) => {}
            Err(e) => error!(target: "Plugin", "处理消息 {:?} 出错: {}", msg.raw_text, e),
        }
    }
}
