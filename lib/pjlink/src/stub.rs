//! In-process projector for tests: a TCP listener on `127.0.0.1` that greets,
//! keeps power/mute/freeze state and can be scripted per command.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

use crate::codec::{self, TERMINATOR};
use crate::{Address, FreezeState, MuteState, PowerState};

#[derive(Clone, Debug)]
enum Script {
    Reply(String),
    Silent,
}

#[derive(Clone, Debug)]
pub struct MockState {
    pub greeting: String,
    pub power: PowerState,
    pub mute: MuteState,
    pub freeze: FreezeState,
    pub lamp_hours: u32,
    pub input: String,
    pub error: String,
    scripts: HashMap<String, Script>,
    received: HashMap<String, usize>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            greeting: "PJLINK 0".to_string(),
            power: PowerState::Off,
            mute: MuteState::Unmuted,
            freeze: FreezeState::Normal,
            lamp_hours: 1234,
            input: "11".to_string(),
            error: "000000".to_string(),
            scripts: HashMap::new(),
            received: HashMap::new(),
        }
    }
}

impl MockState {
    fn handle(&mut self, command: &str) -> Option<String> {
        *self.received.entry(command.to_string()).or_default() += 1;

        if let Some(script) = self.scripts.get(command) {
            return match script {
                Script::Reply(reply) => Some(reply.clone()),
                Script::Silent => None,
            };
        }

        let reply = match command {
            "%1POWR ?" => format!("%1POWR={}", power_code(self.power)),
            "%1POWR 1" => {
                self.power = PowerState::On;
                "%1POWR=OK".to_string()
            }
            "%1POWR 0" => {
                self.power = PowerState::Off;
                "%1POWR=OK".to_string()
            }
            "%1AVMT ?" => match self.mute {
                MuteState::Muted => "%1AVMT=31".to_string(),
                _ => "%1AVMT=30".to_string(),
            },
            "%1AVMT 31" => {
                self.mute = MuteState::Muted;
                "%1AVMT=OK".to_string()
            }
            "%1AVMT 30" => {
                self.mute = MuteState::Unmuted;
                "%1AVMT=OK".to_string()
            }
            "%2FREZ ?" => match self.freeze {
                FreezeState::Frozen => "%2FREZ=1".to_string(),
                FreezeState::Unsupported => "%2FREZ=ERR1".to_string(),
                _ => "%2FREZ=0".to_string(),
            },
            "%2FREZ 1" | "%2FREZ 0" if self.freeze == FreezeState::Unsupported => {
                "%2FREZ=ERR1".to_string()
            }
            "%2FREZ 1" => {
                self.freeze = FreezeState::Frozen;
                "%2FREZ=OK".to_string()
            }
            "%2FREZ 0" => {
                self.freeze = FreezeState::Normal;
                "%2FREZ=OK".to_string()
            }
            "%1LAMP ?" => format!("%1LAMP=1 {} 1", self.lamp_hours),
            "%1INPT ?" => format!("%1INPT={}", self.input),
            "%1ERST ?" => format!("%1ERST={}", self.error),
            _ => return None,
        };

        Some(reply)
    }
}

fn power_code(power: PowerState) -> &'static str {
    match power {
        PowerState::Off => "0",
        PowerState::On => "1",
        PowerState::Cooling => "2",
        PowerState::Warming => "3",
        PowerState::Unknown => "9",
    }
}

pub struct MockProjector {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    connections: Arc<AtomicUsize>,
    clients: Arc<Mutex<JoinSet<()>>>,
    server: JoinHandle<()>,
}

impl MockProjector {
    pub async fn start() -> io::Result<MockProjector> {
        Self::with_state(MockState::default()).await
    }

    pub async fn with_state(state: MockState) -> io::Result<MockProjector> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(Mutex::new(state));
        let connections = Arc::new(AtomicUsize::new(0));
        let clients = Arc::new(Mutex::new(JoinSet::new()));

        let server = {
            let state = state.clone();
            let connections = connections.clone();
            let clients = clients.clone();

            tokio::spawn(async move {
                while let Ok((socket, peer)) = listener.accept().await {
                    trace!("mock projector {addr}: accepted {peer}");
                    connections.fetch_add(1, Ordering::SeqCst);
                    clients.lock().await.spawn(serve(socket, state.clone()));
                }
            })
        };

        Ok(MockProjector {
            addr,
            state,
            connections,
            clients,
            server,
        })
    }

    pub fn address(&self) -> Address {
        Address::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// How many times `command` (without terminator) arrived.
    pub async fn received(&self, command: &str) -> usize {
        let state = self.state.lock().await;
        state.received.get(command).copied().unwrap_or_default()
    }

    pub async fn state(&self) -> MockState {
        self.state.lock().await.clone()
    }

    pub async fn update(&self, change: impl FnOnce(&mut MockState)) {
        change(&mut *self.state.lock().await);
    }

    /// Answers `command` with `reply` instead of the built-in behaviour.
    pub async fn respond(&self, command: &str, reply: &str) {
        let mut state = self.state.lock().await;
        state
            .scripts
            .insert(command.to_string(), Script::Reply(reply.to_string()));
    }

    /// Never answers `command`.
    pub async fn ignore(&self, command: &str) {
        let mut state = self.state.lock().await;
        state.scripts.insert(command.to_string(), Script::Silent);
    }

    /// Stops accepting and drops every open connection.
    pub async fn shutdown(mut self) {
        self.server.abort();
        let _ = (&mut self.server).await;

        self.clients.lock().await.shutdown().await;
    }
}

impl Drop for MockProjector {
    fn drop(&mut self) {
        self.server.abort();

        if let Ok(mut clients) = self.clients.try_lock() {
            clients.abort_all();
        }
    }
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<MockState>>) {
    let greeting = format!("{}{TERMINATOR}", state.lock().await.greeting);
    if socket.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut buffer = [0u8; 1024];

    loop {
        let read = match socket.read(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(read) => read,
        };

        let text = String::from_utf8_lossy(&buffer[..read]).to_string();

        for line in text.split(TERMINATOR) {
            let command = codec::decode(line.as_bytes());
            if command.is_empty() {
                continue;
            }

            let reply = state.lock().await.handle(&command);

            if let Some(reply) = reply {
                let reply = format!("{reply}{TERMINATOR}");
                if socket.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// An address nothing listens on.
pub async fn closed_address() -> io::Result<Address> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    drop(listener);

    Ok(Address::new(addr.ip().to_string(), addr.port()))
}
