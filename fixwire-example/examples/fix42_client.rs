//! FIX 4.2 Client Example
//!
//! Logs on, sends one NewOrderSingle, prints the execution reports that come
//! back and logs out.
use async_trait::async_trait;
use fixwire::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};
mod common;
use common::{ExampleConfig, init_logging};

const FIX_VERSION: &str = "FIX.4.2";
const TRANSACT_TIME: u32 = 60;

struct Trader;

#[async_trait]
impl Application for Trader {
    async fn on_logon(&self, session_id: &SessionId) {
        info!("Logged on as {}", session_id.sender_comp_id);
    }

    async fn on_logout(&self, _session_id: &SessionId) {
        info!("Logged out");
    }

    async fn from_app(&self, message: &Message, _session_id: &SessionId) {
        match message.msg_type() {
            MsgType::ExecutionReport => info!(
                "Execution report: order={} status={}",
                message.get_str(tags::CL_ORD_ID).unwrap_or("?"),
                message.get_str(39).unwrap_or("?")
            ),
            other => info!("Received {}", other),
        }
    }

    async fn on_failure(&self, failure: &SessionFailure, _session_id: &SessionId) {
        warn!("Session failure: {}", failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::client();
    info!("Connecting to {} server at {}", FIX_VERSION, cfg.addr());
    let socket = TcpStream::connect(&cfg.addr()).await?;

    let (session, task) = EngineBuilder::new(cfg.session_config(FIX_VERSION)?)
        .with_application(Trader)
        .initiate(socket)?;
    session.wait_logged_on().await?;

    let order = vec![
        Field::string(tags::CL_ORD_ID, "ORD001"),
        Field::string(21, "1"),
        Field::string(tags::SYMBOL, "AAPL"),
        Field::string(tags::SIDE, "1"),
        Field::timestamp(TRANSACT_TIME, Timestamp::now()),
        Field::uint(tags::ORDER_QTY, 100),
        Field::string(tags::ORD_TYPE, "2"),
        Field::decimal(tags::PRICE, Decimal::new(15050, 2)),
    ];
    session.send(MsgType::NewOrderSingle, order).await?;
    info!("Order sent");

    tokio::time::sleep(Duration::from_secs(2)).await;
    session.shutdown(Some("client done")).await;
    task.await??;
    Ok(())
}
