//! 对账循环：账户同步与订单同步
//!
//! 两个循环独立节拍运行，与决策管线互不阻塞；
//! 上一轮未结束时新一轮直接跳过（不叠加）。

pub mod account_sync;
pub mod order_sync;
