//! 网关客户端
//!
//! 所有操作都是对同一个地址的一次 POST，请求体为
//! `{"api": ..., "token": ..., ...参数}`，响应体为
//! `{"code": 0, "result": "...", "returnJson": ...}`。

use crate::config::RobotConfig;
use crate::message::format_text_message;
use crate::{BotError, BotResult, debug, error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex as AsyncMutex;

/// 当前登录的机器人身份，引导后只读，重新引导时整体替换
#[derive(Debug, Clone, PartialEq)]
pub struct RobotIdentity {
    pub server_url: String,
    pub token: String,
    pub wxid: String,
    pub nickname: String,
    /// 网关返回的其他字段
    pub extra: HashMap<String, Value>,
}

/// 群列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    #[serde(rename = "wxid", alias = "id")]
    pub id: String,
    #[serde(rename = "nickname", alias = "name", default)]
    pub name: String,
    #[serde(
        rename = "member_num",
        alias = "member_count",
        alias = "memberCount",
        default
    )]
    pub member_count: u32,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RobotEntry {
    #[serde(default)]
    wxid: String,
    #[serde(default)]
    nickname: String,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

/// GetRobotList 的 returnJson 有两种形态：裸数组或 `{"data": [...]}`；
/// 缺失、null 或空字符串一律视为空列表
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RobotList {
    Bare(Vec<RobotEntry>),
    Wrapped {
        #[serde(default)]
        data: Option<Vec<RobotEntry>>,
    },
}

impl RobotList {
    fn entries(raw: Value) -> BotResult<Vec<RobotEntry>> {
        let list = match raw {
            Value::Null => return Ok(Vec::new()),
            Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
            other => serde_json::from_value(other)?,
        };
        Ok(match list {
            RobotList::Bare(list) => list,
            RobotList::Wrapped { data } => data.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    result: String,
    #[serde(rename = "returnJson", default)]
    return_json: Value,
}

pub struct GatewayClient {
    http: reqwest::Client,
    server: String,
    token: String,
    identity: RwLock<Option<Arc<RobotIdentity>>>,
    // 串行化引导，读者始终看到完整的旧值或新值
    bootstrap_lock: AsyncMutex<()>,
}

impl GatewayClient {
    pub fn new(config: &RobotConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &RobotConfig) -> Self {
        Self {
            http,
            server: config.server.clone(),
            token: config.token.clone(),
            identity: RwLock::new(None),
            bootstrap_lock: AsyncMutex::new(()),
        }
    }

    /// 当前身份快照
    pub fn identity(&self) -> Option<Arc<RobotIdentity>> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_identity(&self) -> BotResult<Arc<RobotIdentity>> {
        match self.identity() {
            Some(id) if !id.wxid.is_empty() => Ok(id),
            _ => Err(BotError::NotBootstrapped),
        }
    }

    /// 调用 GetRobotList，取第一个机器人作为当前身份
    pub async fn bootstrap_identity(&self) -> BotResult<Arc<RobotIdentity>> {
        let _guard = self.bootstrap_lock.lock().await;

        let raw: Value = self.call("GetRobotList", Map::new()).await?;
        let entry = RobotList::entries(raw)?
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Gateway {
                code: 0,
                result: "机器人列表为空".to_string(),
            })?;

        if entry.wxid.is_empty() {
            return Err(BotError::Gateway {
                code: 0,
                result: "机器人 wxid 为空".to_string(),
            });
        }

        let identity = Arc::new(RobotIdentity {
            server_url: self.server.clone(),
            token: self.token.clone(),
            wxid: entry.wxid,
            nickname: entry.nickname,
            extra: entry.extra,
        });

        *self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());

        info!(target: "Gateway", "当前机器人: {} ({})", identity.nickname, identity.wxid);
        Ok(identity)
    }

    /// 获取群列表（不强制刷新）
    pub async fn list_groups(&self) -> BotResult<Vec<GroupInfo>> {
        let identity = self.require_identity()?;
        let mut args = Map::new();
        args.insert("robot_wxid".into(), json!(identity.wxid));
        args.insert("is_refresh".into(), json!("0"));

        let groups: Option<Vec<GroupInfo>> = self.call("GetGrouplist", args).await?;
        Ok(groups.unwrap_or_default())
    }

    /// 发送文本消息；to_wxid 为好友 ID 或群 ID
    pub async fn send_text(&self, to_wxid: &str, msg: &str) -> BotResult<()> {
        let identity = self.require_identity()?;
        let mut args = Map::new();
        args.insert("msg".into(), json!(format_text_message(msg)));
        args.insert("robot_wxid".into(), json!(identity.wxid));
        args.insert("to_wxid".into(), json!(to_wxid));

        let _: Value = self.call("SendTextMsg", args).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, api: &str, args: Map<String, Value>) -> BotResult<T> {
        let mut payload = Map::new();
        payload.insert("api".into(), json!(api));
        payload.insert("token".into(), json!(self.token));
        payload.extend(args);

        debug!(target: "Gateway", "-> {}", api);

        let bytes = self
            .http
            .post(&self.server)
            .json(&payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .inspect_err(|e| error!(target: "Gateway", "{} 请求失败: {}", api, e))?
            .bytes()
            .await?;

        let resp: ApiResponse = serde_json::from_slice(&bytes)?;
        if resp.code != 0 {
            error!(target: "Gateway", "{} 返回错误: {}", api, resp.result);
            return Err(BotError::Gateway {
                code: resp.code,
                result: resp.result,
            });
        }

        Ok(serde_json::from_value(resp.return_json)?)
    }
}
