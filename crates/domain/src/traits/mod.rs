//! 领域接口

mod exchange_trait;

pub use exchange_trait::{
    Exchange, ExchangeError, VenueBalance, VenueOrderAck, VenueOrderRequest, VenueOrderState,
    VenuePosition,
};
