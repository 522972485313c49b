mod rest;

pub use rest::{KucoinClient, KucoinConnector};
