use super::source::EpidemicSnapshot;
use chrono::{NaiveDate, NaiveDateTime};

/// 疫情起算日 2019-12-16 00:00（本地时间）
pub fn outbreak_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 12, 16)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// 起算日至今经过的整天数，向零截断
pub fn days_since_outbreak(now: NaiveDateTime) -> i64 {
    (now - outbreak_epoch()).num_days()
}

pub fn duration_line(days: i64) -> String {
    format!("😷自新冠疫情爆发以来已经过了{}天了，外出记得做好自我防护\n", days)
}

fn v(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}

pub fn render_region(region: &str, s: &EpidemicSnapshot) -> String {
    let mut out = format!("😦{}疫情今日数据统计如下: \n", region);
    out += &format!("* {}\n", v(&s.as_of));
    out += &format!("* 新增本土: {}\n", v(&s.local_new));
    out += &format!("* 新增本土无症状: {}\n", v(&s.local_asymptomatic_new));
    out += &format!("* 现有确诊: {}\n", v(&s.confirmed_active));
    out += &format!("* 累计确诊: {}\n", v(&s.confirmed_total));
    out += &format!("* 累计治愈: {}\n", v(&s.recovered_total));
    out += &format!("* 累计死亡: {}\n", v(&s.death_total));
    out
}

pub fn render_national(s: &EpidemicSnapshot) -> String {
    let mut out = String::from("😦全国疫情今日数据统计如下: \n");
    out += &format!("* 病例{}\n", v(&s.as_of));
    out += &format!("* 新增本土: {}\n", v(&s.local_new));
    out += &format!("* 现有本土: {}\n", v(&s.local_active));
    out += &format!("* 新增本土无症状: {}\n", v(&s.local_asymptomatic_new));
    out += &format!("* 现有本土无症状: {}\n", v(&s.local_asymptomatic_active));
    out += &format!("* 新增境外: {}\n", v(&s.imported_new));
    out += &format!("* 现有境外: {}\n", v(&s.imported_active));
    out += &format!("* 港澳台新增: {}\n", v(&s.hk_macao_taiwan_new));
    out += &format!("* 现有确诊: {}\n", v(&s.confirmed_active));
    out += &format!(
        "* 累计确诊: {}({})\n",
        v(&s.confirmed_total),
        v(&s.confirmed_total_delta)
    );
    out += &format!(
        "* 累计境外: {}({})\n",
        v(&s.imported_total),
        v(&s.imported_total_delta)
    );
    out += &format!(
        "* 累计治愈: {}({})\n",
        v(&s.recovered_total),
        v(&s.recovered_total_delta)
    );
    out += &format!(
        "* 累计死亡: {}({})\n",
        v(&s.death_total),
        v(&s.death_total_delta)
    );
    out
}
