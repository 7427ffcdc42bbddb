//! 订单相关枚举

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// 买入 / 做多
    Buy,
    /// 卖出 / 做空
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// 反向
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl FromStr for OrderSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" | "B" => Ok(OrderSide::Buy),
            "SELL" | "S" => Ok(OrderSide::Sell),
            other => Err(anyhow::anyhow!("unknown order side: {}", other)),
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.to_lowercase();
        if text.contains("market") {
            Ok(OrderType::Market)
        } else if text.contains("limit") || text == "post_only" {
            Ok(OrderType::Limit)
        } else {
            Err(anyhow::anyhow!("unknown order type: {}", s))
        }
    }
}

/// 有效期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// 一直有效直到撤单
    Gtc,
    /// 未成交部分立即撤销
    Ioc,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
        }
    }
}

impl FromStr for TimeInForce {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GTC" => Ok(TimeInForce::Gtc),
            "IOC" => Ok(TimeInForce::Ioc),
            other => Err(anyhow::anyhow!("unknown time in force: {}", other)),
        }
    }
}

/// 订单状态
///
/// 状态机：NEW -> ACCEPTED -> PARTIALLY_FILLED -> FILLED，
/// 任意非终态可转入 CANCELED / REJECTED / EXPIRED，终态不可再变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// 是否处于可成交状态
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Accepted | OrderStatus::PartiallyFilled
        )
    }

    /// 状态机合法后继判断
    ///
    /// PARTIALLY_FILLED -> PARTIALLY_FILLED 合法（后续分批成交，每次都追加事件）
    pub fn can_transition(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired => true,
            OrderStatus::Accepted => *self == OrderStatus::New,
            OrderStatus::PartiallyFilled => {
                matches!(self, OrderStatus::Accepted | OrderStatus::PartiallyFilled)
            }
            OrderStatus::Filled => {
                matches!(self, OrderStatus::Accepted | OrderStatus::PartiallyFilled)
            }
            OrderStatus::New => false,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "ACCEPTED" => Ok(OrderStatus::Accepted),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" | "CANCELLED" => Ok(OrderStatus::Canceled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "EXPIRED" => Ok(OrderStatus::Expired),
            other => Err(anyhow::anyhow!("unknown order status: {}", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 持仓方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Flat => "FLAT",
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
            PositionSide::Flat => 0.0,
        }
    }
}

impl FromStr for PositionSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Ok(PositionSide::Long),
            "SHORT" | "SELL" => Ok(PositionSide::Short),
            "FLAT" | "NET" | "NONE" => Ok(PositionSide::Flat),
            other => Err(anyhow::anyhow!("unknown position side: {}", other)),
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_cannot_transition() {
        for terminal in [
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(!terminal.can_transition(OrderStatus::Canceled));
            assert!(!terminal.can_transition(OrderStatus::Filled));
        }
    }

    #[test]
    fn fill_path_is_legal() {
        assert!(OrderStatus::New.can_transition(OrderStatus::Accepted));
        assert!(OrderStatus::Accepted.can_transition(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition(OrderStatus::Filled));
        assert!(OrderStatus::Accepted.can_transition(OrderStatus::Filled));
    }

    #[test]
    fn new_cannot_fill_before_accept() {
        assert!(!OrderStatus::New.can_transition(OrderStatus::Filled));
        assert!(!OrderStatus::New.can_transition(OrderStatus::PartiallyFilled));
    }
}
