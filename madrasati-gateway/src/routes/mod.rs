pub mod health;
pub mod proxy;
pub mod rate_limit;
