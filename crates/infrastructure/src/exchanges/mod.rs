pub mod okx_adapter;
pub mod retry;
pub mod simulated;
