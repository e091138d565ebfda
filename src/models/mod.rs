pub mod almgren_chriss;
pub mod fees;
pub mod maker_taker;
pub mod regression;
pub mod slippage;
pub mod stats;
