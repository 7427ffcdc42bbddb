use anyhow::anyhow;
use chrono::{DateTime, Utc};

/// 当前UTC毫秒时间戳
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// 当前UTC秒级时间戳
pub fn now_s() -> i64 {
    Utc::now().timestamp()
}

/// 毫秒时间戳转 ISO-8601 字符串（UTC），非法时间戳返回 None
pub fn ms_to_iso(ts: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ts).map(|dt| dt.to_rfc3339())
}

/// 解析周期字符串为毫秒数（仅支持 >= 15m 的周期）
pub fn parse_period_to_mill(period: &str) -> anyhow::Result<i64> {
    let duration = match period.to_lowercase().as_str() {
        "15m" => 15 * 60,
        "30m" => 30 * 60,
        "1h" => 3600,
        "2h" => 2 * 3600,
        "4h" => 4 * 3600,
        "6h" => 6 * 3600,
        "12h" => 12 * 3600,
        "1d" => 24 * 3600,
        _ => return Err(anyhow!("Unsupported period format {}", period)),
    };
    Ok(duration * 1000)
}

/// 时间戳向下对齐到周期边界
pub fn align_to_bar(ts: i64, interval_ms: i64) -> i64 {
    if interval_ms <= 0 {
        return ts;
    }
    ts - ts.rem_euclid(interval_ms)
}

/// 判断时间戳是否正好落在周期边界上
pub fn is_bar_aligned(ts: i64, interval_ms: i64) -> bool {
    interval_ms > 0 && ts.rem_euclid(interval_ms) == 0
}

/// 当前毫秒级时间增加指定周期的毫秒数
pub fn ts_add_n_period(ts: i64, period: &str, n: usize) -> anyhow::Result<i64> {
    let mill = parse_period_to_mill(period)?;
    Ok(ts + n as i64 * mill)
}

/// 当前毫秒级时间减少指定周期的毫秒数
pub fn ts_reduce_n_period(ts: i64, period: &str, n: usize) -> anyhow::Result<i64> {
    let mill = parse_period_to_mill(period)?;
    Ok(ts - n as i64 * mill)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parsing() {
        assert_eq!(parse_period_to_mill("15m").unwrap(), 900_000);
        assert_eq!(parse_period_to_mill("1H").unwrap(), 3_600_000);
        assert!(parse_period_to_mill("1m").is_err());
        assert!(parse_period_to_mill("x").is_err());
    }

    #[test]
    fn bar_alignment() {
        let interval = 3_600_000;
        let ts = 1_700_001_234_567_i64;
        let aligned = align_to_bar(ts, interval);
        assert!(is_bar_aligned(aligned, interval));
        assert!(aligned <= ts && ts - aligned < interval);
    }

    #[test]
    fn period_arithmetic() {
        let ts = 1_700_000_000_000_i64;
        assert_eq!(ts_add_n_period(ts, "1h", 2).unwrap(), ts + 7_200_000);
        assert_eq!(ts_reduce_n_period(ts, "15m", 4).unwrap(), ts - 3_600_000);
    }
}
