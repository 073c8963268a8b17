//! OneBot v11 Console
//!
//! Connects the OneBot adapter to a callback that logs every message and
//! event, and answers `.echo <text>` so outbound sends can be exercised
//! against a live gateway.
//!
//! # Usage
//!
//! ```bash
//! # Dial a gateway (the default when nothing else is configured)
//! OB11_WS_REVERSE=ws://127.0.0.1:8100/onebot/v11/ws cargo run -p ob11-console
//!
//! # Let the gateway dial us
//! cargo run -p ob11-console -- --ws-forward 0.0.0.0:8101 --access-token secret
//! ```
//!
//! Settings from `dicebot.toml` (`[adapters.onebot]`) apply first; flags and
//! `OB11_*` variables override them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dicebot::onebot::{OneBotAdapter, OneBotConfig};
use dicebot::prelude::*;
use dicebot::runtime::config::validate_ws_url;
use tracing::{debug, info, warn};

const DEFAULT_REVERSE_URL: &str = "ws://127.0.0.1:8100/onebot/v11/ws";

#[derive(Parser)]
#[command(name = "ob11-console")]
#[command(version, about = "Debug console for the OneBot v11 adapter", long_about = None)]
struct Cli {
    /// Gateway URL to dial (reverse mode)
    #[arg(long, env = "OB11_WS_REVERSE")]
    ws_reverse: Option<String>,

    /// Address to accept gateway connections on (forward mode)
    #[arg(long, env = "OB11_WS_FORWARD")]
    ws_forward: Option<String>,

    /// Bearer token used in both directions
    #[arg(long, env = "OB11_ACCESS_TOKEN")]
    access_token: Option<String>,

    /// Value of the X-Self-Secret header sent when dialing
    #[arg(long, env = "OB11_SECRET")]
    secret: Option<String>,

    /// Configuration file; `dicebot.toml` in the current directory otherwise
    #[arg(short, long, env = "DICEBOT_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    fn apply(self, mut config: OneBotConfig) -> OneBotConfig {
        if let Some(url) = self.ws_reverse {
            config.ws_reverse = url;
        }
        if let Some(addr) = self.ws_forward {
            config.ws_forward = addr;
        }
        if let Some(token) = self.access_token {
            config.access_token = token;
        }
        if let Some(secret) = self.secret {
            config.secret = secret;
        }
        if config.reverse_url().is_none() && config.forward_addr().is_none() {
            config.ws_reverse = DEFAULT_REVERSE_URL.to_string();
        }
        config
    }
}

/// Logs inbound traffic and answers `.echo`.
struct ConsoleCallback {
    adapter: OneBotAdapter,
}

impl ConsoleCallback {
    fn reply(&self, message: &Message, text: &str) {
        let adapter = self.adapter.clone();
        let message_type = message.message_type.clone();
        let target = match message_type {
            MessageType::Group => message.group_id.clone(),
            _ => message.sender.user_id.clone(),
        };
        let request = MessageSendRequest::new(target, MessageSegment::text(text));

        tokio::spawn(async move {
            let sent = match message_type {
                MessageType::Group => adapter.msg_send_to_group(request).await,
                _ => adapter.msg_send_to_person(request).await,
            };
            if let Err(e) = sent {
                warn!(error = %e, "Failed to send echo reply");
            }
        });
    }
}

impl AdapterCallback for ConsoleCallback {
    fn on_error(&self, err: &AdapterError) {
        warn!(error = %err, "Adapter error");
    }

    fn on_message_received(&self, info: MessageSendCallbackInfo) {
        let message = &info.message;
        match serde_json::to_string(message) {
            Ok(json) => info!(text = %message.message, "Message: {json}"),
            Err(e) => warn!(error = %e, "Failed to encode message"),
        }

        // Echoes of our own sends carry no sender and are not answered.
        if info.sender.is_none() {
            return;
        }
        if let Some(text) = message.message.trim().strip_prefix(".echo ") {
            self.reply(message, text.trim());
        }
    }

    fn on_event(&self, event: AdapterEvent) {
        if event.event_type == "heartbeat" {
            debug!("Heartbeat");
            return;
        }
        match serde_json::to_string(&event) {
            Ok(json) => info!(event_type = %event.event_type, "Event: {json}"),
            Err(e) => warn!(error = %e, "Failed to encode event"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = AdapterRuntime::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build()?;

    let config = cli.apply(runtime.adapter_config::<OneBotConfig>("onebot")?);
    if let Some(url) = config.reverse_url() {
        validate_ws_url(url)?;
    }
    info!(
        reverse = config.reverse_url().unwrap_or("-"),
        forward = config.forward_addr().unwrap_or("-"),
        "OneBot v11 console starting"
    );

    let adapter = OneBotAdapter::new(config);
    adapter.set_callback(Arc::new(ConsoleCallback {
        adapter: adapter.clone(),
    }));
    runtime.register_adapter(adapter).await?;

    runtime.run().await?;
    Ok(())
}
