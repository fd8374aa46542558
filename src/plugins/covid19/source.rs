//! 疫情数据源：百度开放数据接口

use crate::{BotError, BotResult, error};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const DEFAULT_API: &str = "https://opendata.baidu.com/data/inner";

/// 规整后的疫情快照，缺失的标签保持 None
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpidemicSnapshot {
    pub as_of: Option<String>,
    pub local_new: Option<String>,
    pub local_active: Option<String>,
    pub local_asymptomatic_new: Option<String>,
    pub local_asymptomatic_active: Option<String>,
    pub imported_new: Option<String>,
    pub imported_active: Option<String>,
    pub hk_macao_taiwan_new: Option<String>,
    pub confirmed_active: Option<String>,
    pub confirmed_total: Option<String>,
    pub confirmed_total_delta: Option<String>,
    pub imported_total: Option<String>,
    pub imported_total_delta: Option<String>,
    pub recovered_total: Option<String>,
    pub recovered_total_delta: Option<String>,
    pub death_total: Option<String>,
    pub death_total_delta: Option<String>,
}

#[async_trait]
pub trait EpidemicSource: Send + Sync {
    async fn fetch_national(&self) -> BotResult<EpidemicSnapshot>;
    async fn fetch_region(&self, name: &str) -> BotResult<EpidemicSnapshot>;
}

// ================= 响应结构 =================

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(rename = "Result", alias = "result", default)]
    pub result: Vec<ResultItem>,
}

#[derive(Debug, Deserialize)]
pub struct ResultItem {
    #[serde(rename = "DisplayData", alias = "displayData")]
    pub display_data: DisplayData,
}

#[derive(Debug, Deserialize)]
pub struct DisplayData {
    #[serde(rename = "resultData", alias = "ResultData")]
    pub result_data: ResultData,
}

#[derive(Debug, Deserialize)]
pub struct ResultData {
    #[serde(rename = "tplData", alias = "TplData")]
    pub tpl_data: TplData,
}

#[derive(Debug, Deserialize)]
pub struct TplData {
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(rename = "dataList", alias = "data_list", alias = "DataList", default)]
    pub data_list: Vec<DataItem>,
    #[serde(
        rename = "dynamic_list",
        alias = "dynamicList",
        alias = "DynamicList",
        default
    )]
    pub dynamic_list: Vec<DynamicItem>,
}

#[derive(Debug, Deserialize)]
pub struct DynamicItem {
    #[serde(rename = "dataList", alias = "data_list", alias = "DataList", default)]
    pub data_list: Vec<DataItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataItem {
    #[serde(rename = "totalDesc", alias = "total_desc", default)]
    pub total_desc: String,
    #[serde(
        rename = "totalNum",
        alias = "total_num",
        default,
        deserialize_with = "lenient_string"
    )]
    pub total_num: Option<String>,
    #[serde(
        rename = "changeNum",
        alias = "change_num",
        default,
        deserialize_with = "lenient_string"
    )]
    pub change_num: Option<String>,
}

/// 数值字段有时是字符串，有时是数字
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

// ================= 标签映射 =================

type Setter = fn(&mut EpidemicSnapshot, &DataItem);

/// 全国：包含累计值与变化量
pub static NATIONAL_PROJECTION: &[(&str, Setter)] = &[
    ("新增本土", |s, d| s.local_new = d.total_num.clone()),
    ("现有本土", |s, d| s.local_active = d.total_num.clone()),
    ("新增本土无症状", |s, d| {
        s.local_asymptomatic_new = d.total_num.clone()
    }),
    ("现有本土无症状", |s, d| {
        s.local_asymptomatic_active = d.total_num.clone()
    }),
    ("新增境外", |s, d| s.imported_new = d.total_num.clone()),
    ("现有境外", |s, d| s.imported_active = d.total_num.clone()),
    ("港澳台新增", |s, d| s.hk_macao_taiwan_new = d.total_num.clone()),
    ("现有确诊", |s, d| s.confirmed_active = d.total_num.clone()),
    ("累计确诊", |s, d| {
        s.confirmed_total = d.total_num.clone();
        s.confirmed_total_delta = d.change_num.clone();
    }),
    ("累计境外", |s, d| {
        s.imported_total = d.total_num.clone();
        s.imported_total_delta = d.change_num.clone();
    }),
    ("累计治愈", |s, d| {
        s.recovered_total = d.total_num.clone();
        s.recovered_total_delta = d.change_num.clone();
    }),
    ("累计死亡", |s, d| {
        s.death_total = d.total_num.clone();
        s.death_total_delta = d.change_num.clone();
    }),
];

/// 地区：接口不提供变化量，只取累计值
pub static REGION_PROJECTION: &[(&str, Setter)] = &[
    ("新增本土", |s, d| s.local_new = d.total_num.clone()),
    ("新增本土无症状", |s, d| {
        s.local_asymptomatic_new = d.total_num.clone()
    }),
    ("现有确诊", |s, d| s.confirmed_active = d.total_num.clone()),
    ("累计确诊", |s, d| s.confirmed_total = d.total_num.clone()),
    ("累计治愈", |s, d| s.recovered_total = d.total_num.clone()),
    ("累计死亡", |s, d| s.death_total = d.total_num.clone()),
];

/// 按标签精确匹配投影，未知标签忽略
pub fn project(
    table: &[(&str, Setter)],
    as_of: Option<String>,
    items: &[DataItem],
) -> EpidemicSnapshot {
    let mut snapshot = EpidemicSnapshot {
        as_of,
        ..Default::default()
    };
    for item in items {
        if let Some((_, set)) = table.iter().find(|(label, _)| *label == item.total_desc) {
            set(&mut snapshot, item);
        }
    }
    snapshot
}

impl ApiResponse {
    fn into_tpl_data(self, query: &str) -> BotResult<TplData> {
        self.result
            .into_iter()
            .next()
            .map(|r| r.display_data.result_data.tpl_data)
            .ok_or_else(|| BotError::DataUnavailable(query.to_string()))
    }

    pub fn into_national(self) -> BotResult<EpidemicSnapshot> {
        let tpl = self.into_tpl_data("国内")?;
        let list = tpl
            .dynamic_list
            .first()
            .ok_or_else(|| BotError::DataUnavailable("国内".to_string()))?;
        Ok(project(NATIONAL_PROJECTION, tpl.desc.clone(), &list.data_list))
    }

    pub fn into_region(self, name: &str) -> BotResult<EpidemicSnapshot> {
        let tpl = self.into_tpl_data(name)?;
        Ok(project(REGION_PROJECTION, tpl.desc, &tpl.data_list))
    }
}

// ================= HTTP 数据源 =================

pub struct BaiduOpenData {
    http: reqwest::Client,
    api: String,
}

impl BaiduOpenData {
    pub fn new(api: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api)
    }

    pub fn with_client(http: reqwest::Client, api: impl Into<String>) -> Self {
        Self {
            http,
            api: api.into(),
        }
    }

    async fn query(&self, region: &str) -> BotResult<ApiResponse> {
        let query = format!("{}新型肺炎最新动态", region);
        let bytes = self
            .http
            .get(&self.api)
            .query(&[
                ("resource_id", "5653"),
                ("query", query.as_str()),
                ("dsp", "iphone"),
                ("tn", "wisexmlnew"),
                ("alr", "1"),
                ("is_opendata", "1"),
            ])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .inspect_err(|e| error!(target: "Covid19", "请求疫情接口失败: {}", e))?
            .bytes()
            .await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            error!(target: "Covid19", "解析疫情数据失败: {}", e);
            BotError::Decode(e)
        })
    }
}

#[async_trait]
impl EpidemicSource for BaiduOpenData {
    async fn fetch_national(&self) -> BotResult<EpidemicSnapshot> {
        self.query("国内").await?.into_national()
    }

    async fn fetch_region(&self, name: &str) -> BotResult<EpidemicSnapshot> {
        self.query(name).await?.into_region(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn item(label: &str, total: &str, change: &str) -> DataItem {
        DataItem {
            total_desc: label.to_string(),
            total_num: Some(total.to_string()),
            change_num: Some(change.to_string()),
        }
    }

    #[test]
    fn national_table_maps_deltas() {
        let items = vec![
            item("新增本土", "12", ""),
            item("港澳台新增", "4", ""),
            item("累计确诊", "1000", "+12"),
            item("累计死亡", "5", "+0"),
            item("未知标签", "1", "1"),
        ];
        let s = project(NATIONAL_PROJECTION, Some("截至今日".into()), &items);
        assert_eq!(s.as_of.as_deref(), Some("截至今日"));
        assert_eq!(s.local_new.as_deref(), Some("12"));
        assert_eq!(s.hk_macao_taiwan_new.as_deref(), Some("4"));
        assert_eq!(s.confirmed_total.as_deref(), Some("1000"));
        assert_eq!(s.confirmed_total_delta.as_deref(), Some("+12"));
        assert_eq!(s.death_total_delta.as_deref(), Some("+0"));
        assert_eq!(s.recovered_total, None);
    }

    #[test]
    fn region_table_drops_deltas_and_national_only_labels() {
        let items = vec![
            item("新增本土", "3", "+3"),
            item("现有本土", "9", ""),
            item("累计确诊", "120", "+3"),
            item("累计治愈", "100", "+1"),
        ];
        let s = project(REGION_PROJECTION, None, &items);
        assert_eq!(s.local_new.as_deref(), Some("3"));
        assert_eq!(s.confirmed_total.as_deref(), Some("120"));
        assert_eq!(s.recovered_total.as_deref(), Some("100"));
        assert_eq!(s.local_active, None);
        assert_eq!(s.confirmed_total_delta, None);
        assert_eq!(s.recovered_total_delta, None);
    }

    #[test]
    fn numbers_may_be_numeric() {
        let d: DataItem =
            serde_json::from_value(json!({"totalDesc": "累计确诊", "totalNum": 120, "changeNum": null}))
                .unwrap();
        assert_eq!(d.total_num.as_deref(), Some("120"));
        assert_eq!(d.change_num, None);
    }

    #[test]
    fn empty_result_is_unavailable() {
        let resp: ApiResponse = serde_json::from_value(json!({"Result": []})).unwrap();
        assert!(matches!(
            resp.into_region("济南"),
            Err(BotError::DataUnavailable(q)) if q == "济南"
        ));

        let resp: ApiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            resp.into_national(),
            Err(BotError::DataUnavailable(_))
        ));
    }

    fn region_body() -> String {
        json!({
            "ResultCode": "0",
            "Result": [{
                "DisplayData": {
                    "resultData": {
                        "tplData": {
                            "desc": "更新至 12-01 10:00",
                            "dataList": [
                                {"totalDesc": "新增本土", "totalNum": "3", "changeNum": "+3"},
                                {"totalDesc": "累计确诊", "totalNum": "120", "changeNum": "+3"}
                            ]
                        }
                    }
                }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn fetch_region_queries_by_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data/inner")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("resource_id".into(), "5653".into()),
                Matcher::UrlEncoded("query".into(), "济南新型肺炎最新动态".into()),
            ]))
            .with_status(200)
            .with_body(region_body())
            .create_async()
            .await;

        let source = BaiduOpenData::new(format!("{}/data/inner", server.url()));
        let s = source.fetch_region("济南").await.unwrap();

        mock.assert_async().await;
        assert_eq!(s.as_of.as_deref(), Some("更新至 12-01 10:00"));
        assert_eq!(s.local_new.as_deref(), Some("3"));
        assert_eq!(s.confirmed_total_delta, None);
    }

    #[tokio::test]
    async fn fetch_national_reads_dynamic_list() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/inner")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "国内新型肺炎最新动态".into(),
            ))
            .with_status(200)
            .with_body(
                json!({"Result": [{"DisplayData": {"resultData": {"tplData": {
                    "desc": "全国数据",
                    "dynamic_list": [{"dataList": [
                        {"totalDesc": "累计治愈", "totalNum": "900", "changeNum": "+20"}
                    ]}]
                }}}}]})
                .to_string(),
            )
            .create_async()
            .await;

        let source = BaiduOpenData::new(format!("{}/data/inner", server.url()));
        let s = source.fetch_national().await.unwrap();
        assert_eq!(s.recovered_total.as_deref(), Some("900"));
        assert_eq!(s.recovered_total_delta.as_deref(), Some("+20"));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/inner")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let source = BaiduOpenData::new(format!("{}/data/inner", server.url()));
        assert!(matches!(
            source.fetch_region("北京").await,
            Err(BotError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn empty_result_over_http_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/inner")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ResultCode":"0","Result":[]}"#)
            .create_async()
            .await;

        let source = BaiduOpenData::new(format!("{}/data/inner", server.url()));
        assert!(matches!(
            source.fetch_national().await,
            Err(BotError::DataUnavailable(_))
        ));
    }
}
