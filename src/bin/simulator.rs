//! Synthetic telemetry endpoint for local development
//!
//! Serves a WebSocket on `ws://127.0.0.1:<port>/` that streams `metrics`,
//! `kpi` and `heartbeat` frames. Point gqlpulse at it with
//! `GQLPULSE_ENDPOINTS=local=ws://127.0.0.1:4000/`.
//!
//! Usage: simulator [port] [records_per_tick] [tick_ms]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

const OPERATIONS: &[&str] = &[
    "GetUser", "ListOrders", "GetOrder", "SearchProducts", "GetCart", "AddToCart", "Checkout",
    "UpdateProfile", "ListReviews", "GetRecommendations",
];
const ERRORS: &[&str] = &[
    "Timeout exceeded", "Field resolver failed", "Unauthorized", "Rate limit", "Upstream 502",
    "Query complexity too high",
];

/// Ticks between server-side KPI frames
const KPI_EVERY: u64 = 20;
/// Ticks between heartbeats
const HEARTBEAT_EVERY: u64 = 30;
/// Roughly one record in this many is deliberately invalid
const INVALID_ONE_IN: u64 = 200;

fn fast_random(seed: &mut u64) -> u64 {
    *seed ^= *seed << 13;
    *seed ^= *seed >> 7;
    *seed ^= *seed << 17;
    *seed
}

fn generate_metrics(count: usize, seed: &mut u64) -> Value {
    let now = chrono::Utc::now().timestamp_millis();

    let metrics: Vec<Value> = (0..count)
        .map(|i| {
            let ts = now - (i as i64 * 5) - (fast_random(seed) % 50) as i64;
            let operation = OPERATIONS[fast_random(seed) as usize % OPERATIONS.len()];

            if fast_random(seed) % INVALID_ONE_IN == 0 {
                return json!({ "timestamp": ts, "operationName": operation, "executionTime": -1 });
            }

            // Long tail: most calls are fast, a few are slow
            let base = 5 + fast_random(seed) % 120;
            let duration = if fast_random(seed) % 20 == 0 { base * 10 } else { base };
            let errors: Vec<Value> = if fast_random(seed) % 25 == 0 {
                vec![json!({ "message": ERRORS[fast_random(seed) as usize % ERRORS.len()] })]
            } else {
                vec![]
            };

            json!({
                "timestamp": ts,
                "operationName": operation,
                "executionTime": duration,
                "errors": errors
            })
        })
        .collect();

    json!({ "type": "metrics", "metrics": metrics })
}

fn generate_kpi(seed: &mut u64) -> Value {
    json!({
        "type": "kpi",
        "kpi": {
            "activeConnections": 20 + fast_random(seed) % 80,
            "computedAt": chrono::Utc::now().to_rfc3339()
        }
    })
}

struct Settings {
    records_per_tick: usize,
    tick: Duration,
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    println!("[{}] connected", peer);

    let mut seed = 0x9E37_79B9_7F4A_7C15 ^ peer.port() as u64;
    let mut ticker = tokio::time::interval(settings.tick);
    let mut tick: u64 = 0;
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick += 1;
                let frame = generate_metrics(settings.records_per_tick, &mut seed);
                write.send(Message::Text(frame.to_string())).await?;
                sent += settings.records_per_tick as u64;

                if tick % KPI_EVERY == 0 {
                    write.send(Message::Text(generate_kpi(&mut seed).to_string())).await?;
                }
                if tick % HEARTBEAT_EVERY == 0 {
                    write.send(Message::Text(json!({ "type": "heartbeat" }).to_string())).await?;
                    println!("[{}] {} records sent", peer, sent);
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) if text.contains("heartbeat") => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    println!("[{}] disconnected after {} records", peer, sent);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(4000);
    let records_per_tick: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
    let tick_ms: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(500);

    println!("gqlpulse Telemetry Simulator");
    println!("============================");
    println!("Listening:         ws://127.0.0.1:{}/", port);
    println!("Records per tick:  {}", records_per_tick);
    println!("Tick:              {} ms", tick_ms);
    println!();

    let settings = Arc::new(Settings {
        records_per_tick,
        tick: Duration::from_millis(tick_ms.max(1)),
    });

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    loop {
        let (stream, peer) = listener.accept().await?;
        let settings = Arc::clone(&settings);
        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, peer, &settings).await {
                eprintln!("[{}] error: {}", peer, e);
            }
        });
    }
}
