//! FIX 4.2 Server Example
//!
//! Accepts initiator connections, logs every NewOrderSingle and answers it
//! with an ExecutionReport acknowledging the order.
use async_trait::async_trait;
use fixwire::prelude::*;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
mod common;
use common::{ExampleConfig, init_logging};

const FIX_VERSION: &str = "FIX.4.2";

/// Forwards orders to a responder task; callbacks must not wait on the
/// session they are called from.
struct OrderDesk {
    orders: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Application for OrderDesk {
    async fn on_logon(&self, session_id: &SessionId) {
        info!("Logon from {}", session_id.target_comp_id);
    }

    async fn on_logout(&self, session_id: &SessionId) {
        info!("Logout from {}", session_id.target_comp_id);
    }

    async fn from_app(&self, message: &Message, _session_id: &SessionId) {
        if message.msg_type() != MsgType::NewOrderSingle {
            warn!("Unhandled: {}", message.msg_type());
            return;
        }
        info!(
            symbol = message.get_str(tags::SYMBOL).unwrap_or("N/A"),
            side = message.get_str(tags::SIDE).unwrap_or("?"),
            qty = message.get_str(tags::ORDER_QTY).unwrap_or("0"),
            price = message.get_str(tags::PRICE).unwrap_or("0"),
            "order received"
        );
        let _ = self.orders.send(message.clone());
    }

    async fn on_failure(&self, failure: &SessionFailure, _session_id: &SessionId) {
        warn!("Session failure: {}", failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::server();
    info!("Starting {} server on {}", FIX_VERSION, cfg.addr());
    let listener = TcpListener::bind(&cfg.addr()).await?;
    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from {}", addr);
        let cfg = cfg.clone();
        tokio::spawn(async move {
            if let Err(e) = handle(socket, cfg).await {
                error!("Error: {}", e);
            }
        });
    }
}

async fn handle(socket: TcpStream, cfg: ExampleConfig) -> anyhow::Result<()> {
    let (orders, mut incoming) = mpsc::unbounded_channel();
    let (session, task) = EngineBuilder::new(cfg.session_config(FIX_VERSION)?)
        .with_application(OrderDesk { orders })
        .accept(socket)?;

    // ends when the session task drops the application
    let responder = tokio::spawn(async move {
        let mut exec_id = 0u64;
        while let Some(order) = incoming.recv().await {
            exec_id += 1;
            if let Err(e) = session
                .send(MsgType::ExecutionReport, build_exec(&order, exec_id))
                .await
            {
                warn!("Could not acknowledge order: {}", e);
                break;
            }
        }
    });

    task.await??;
    responder.await?;
    Ok(())
}

fn build_exec(order: &Message, exec_id: u64) -> Vec<Field> {
    let clid = order.get_str(tags::CL_ORD_ID).unwrap_or("0");
    vec![
        Field::string(37, &format!("O{}", clid)),
        Field::string(tags::CL_ORD_ID, clid),
        Field::string(17, &format!("E{}", exec_id)),
        Field::string(20, "0"),
        Field::string(150, "0"),
        Field::string(39, "0"),
        Field::string(tags::SYMBOL, order.get_str(tags::SYMBOL).unwrap_or("N/A")),
        Field::string(tags::SIDE, order.get_str(tags::SIDE).unwrap_or("1")),
        Field::string(151, order.get_str(tags::ORDER_QTY).unwrap_or("0")),
        Field::string(14, "0"),
        Field::string(6, "0"),
    ]
}
