mod candle_item;

pub use candle_item::{CandleItem, CandleItemBuilder};
