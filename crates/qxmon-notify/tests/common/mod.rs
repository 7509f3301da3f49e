//! Mock Socket.IO server for integration tests.
//!
//! Speaks just enough Engine.IO v4 over websocket to drive the listener:
//! - sends the open handshake on accept
//! - answers the namespace connect with `40{"sid":..}`
//! - records every text frame received
//! - pushes scripted frames or drops all connections on request

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Command {
    Push(String),
    Drop,
}

pub struct MockSocketIoServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<Command>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockSocketIoServer {
    /// Start on an available port. `ping_interval_ms` is advertised in the
    /// handshake.
    pub async fn start(ping_interval_ms: u64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let (commands, _) = broadcast::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let commands_clone = commands.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            ping_interval_ms,
                            commands_clone.subscribe(),
                            messages_clone.clone(),
                            connections_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/socket.io/?EIO=4&transport=websocket", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Wait until `frame` has been received `times` times in total.
    pub async fn wait_for_message(&self, frame: &str, times: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let seen = self
                    .messages
                    .lock()
                    .await
                    .iter()
                    .filter(|m| m.as_str() == frame)
                    .count();
                if seen >= times {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("frame {frame:?} not received {times} times"));
    }

    /// Send a raw Engine.IO frame to every open connection.
    pub fn push(&self, frame: &str) {
        let _ = self.commands.send(Command::Push(frame.to_string()));
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    ping_interval_ms: u64,
    mut commands: broadcast::Receiver<Command>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let open = format!(
        r#"0{{"sid":"mock","upgrades":[],"pingInterval":{ping_interval_ms},"pingTimeout":{ping_interval_ms},"maxPayload":1000000}}"#
    );
    if write.send(Message::Text(open)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        messages.lock().await.push(text.clone());
                        if text == "40" {
                            let _ = write.send(Message::Text(r#"40{"sid":"ns-mock"}"#.to_string())).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Ok(Command::Push(frame)) => {
                        let _ = write.send(Message::Text(frame)).await;
                    }
                    Ok(Command::Drop) | Err(_) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}
