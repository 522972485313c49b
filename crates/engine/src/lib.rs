pub mod cycle;
pub mod kucoin;
pub mod pricing;
pub mod settle;
pub mod supervisor;
pub mod sweeper;
pub mod waiter;

pub use cycle::{CycleOutcome, CycleWorker};
pub use kucoin::{KucoinClient, KucoinConnector};
pub use supervisor::Supervisor;
pub use sweeper::Sweeper;
