//! In-process mock cluster node for tests.
//!
//! Speaks RESP over a real TCP listener and keeps strings, hashes and TTLs
//! in memory. Faults can be queued to drop the connection or force a reply
//! on the next data command; control commands (`PING`, `AUTH`, `SELECT`,
//! `CLUSTER`, `ASKING`) are never faulted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::core::connection::Connection;
use crate::proto::frame::Frame;

/// A scripted failure for the next data command.
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    /// Close the connection without replying.
    Disconnect,
    /// Reply with this frame instead of executing the command.
    Reply(Frame),
}

#[derive(Default)]
struct State {
    address: String,
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    ttls: HashMap<String, u64>,
    slots: Vec<(u16, u16, String)>,
    faults: VecDeque<Fault>,
    overrides: HashMap<String, Frame>,
    log: Vec<Vec<String>>,
    connections: usize,
    tasks: Vec<JoinHandle<()>>,
}

pub(crate) struct MockNode {
    address: String,
    state: Arc<Mutex<State>>,
    accept_task: JoinHandle<()>,
}

enum Outcome {
    Reply(Frame),
    Disconnect,
}

impl MockNode {
    /// Starts a node owning every slot.
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(State {
            address: address.clone(),
            ..State::default()
        }));

        let accept_task = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let task = tokio::spawn(serve(stream, Arc::clone(&state)));
                    let mut guard = state.lock().unwrap();
                    guard.connections += 1;
                    guard.tasks.push(task);
                }
            })
        };

        Self {
            address,
            state,
            accept_task,
        }
    }

    /// Starts `n` nodes that split the slot space evenly and agree on it.
    pub(crate) async fn start_cluster(n: usize) -> Vec<Self> {
        let mut nodes = Vec::with_capacity(n);
        for _ in 0..n {
            nodes.push(Self::start().await);
        }
        let per_node = 16384 / n;
        let slots: Vec<(u16, u16, String)> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let start = (i * per_node) as u16;
                let end = if i + 1 == n {
                    16383
                } else {
                    ((i + 1) * per_node - 1) as u16
                };
                (start, end, node.address.clone())
            })
            .collect();
        for node in &nodes {
            node.set_slots(slots.clone());
        }
        nodes
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn set_slots(&self, slots: Vec<(u16, u16, String)>) {
        self.state.lock().unwrap().slots = slots;
    }

    pub(crate) fn push_fault(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    /// Always reply to `command` with `reply`.
    pub(crate) fn override_reply(&self, command: &str, reply: Frame) {
        self.state
            .lock()
            .unwrap()
            .overrides
            .insert(command.to_ascii_uppercase(), reply);
    }

    pub(crate) fn string(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().strings.get(key).cloned()
    }

    pub(crate) fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.hashes.get(key).and_then(|h| h.get(field)).cloned()
    }

    pub(crate) fn ttl(&self, key: &str) -> Option<u64> {
        self.state.lock().unwrap().ttls.get(key).copied()
    }

    /// Every command received, oldest first.
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn command_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|args| args[0].eq_ignore_ascii_case(name))
            .count()
    }

    /// Number of connections accepted so far.
    ///
    /// A client's connect can finish before the accept loop runs, so this
    /// waits a moment for pending accepts first.
    pub(crate) async fn connections(&self) -> usize {
        settle().await;
        self.state.lock().unwrap().connections
    }

    /// Closes every open connection, leaving the listener up.
    pub(crate) async fn drop_connections(&self) {
        settle().await;
        for task in self.state.lock().unwrap().tasks.drain(..) {
            task.abort();
        }
    }

    /// Stops listening and closes every connection.
    pub(crate) async fn shutdown(self) {
        self.drop_connections().await;
        self.accept_task.abort();
        let _ = self.accept_task.await;
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn serve(stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut conn = Connection::new(stream);
    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            Err(_) => return,
        };
        let outcome = handle(&mut state.lock().unwrap(), frame);
        match outcome {
            Outcome::Reply(reply) => {
                if conn.write_frame(&reply).await.is_err() {
                    return;
                }
            }
            Outcome::Disconnect => return,
        }
    }
}

fn args_of(frame: Frame) -> Vec<String> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Frame::BulkString(Some(b)) => Some(String::from_utf8_lossy(&b).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn ok() -> Frame {
    Frame::SimpleString(b"OK".to_vec())
}

fn err(message: &str) -> Frame {
    Frame::Error(message.as_bytes().to_vec())
}

fn bulk(value: Option<&String>) -> Frame {
    match value {
        Some(v) => Frame::bulk(v.clone()),
        None => Frame::BulkString(None),
    }
}

fn node_frame(address: &str) -> Frame {
    let (host, port) = address.rsplit_once(':').unwrap();
    Frame::Array(vec![
        Frame::bulk(host.to_string()),
        Frame::Integer(port.parse().unwrap()),
        Frame::bulk(format!("node-{}", port)),
    ])
}

fn handle(state: &mut State, frame: Frame) -> Outcome {
    let args = args_of(frame);
    if args.is_empty() {
        return Outcome::Reply(err("ERR empty command"));
    }
    state.log.push(args.clone());
    let name = args[0].to_ascii_uppercase();

    let control = matches!(
        name.as_str(),
        "PING" | "AUTH" | "SELECT" | "CLUSTER" | "ASKING"
    );
    if !control {
        match state.faults.pop_front() {
            Some(Fault::Disconnect) => return Outcome::Disconnect,
            Some(Fault::Reply(reply)) => return Outcome::Reply(reply),
            None => {}
        }
        if let Some(reply) = state.overrides.get(&name) {
            return Outcome::Reply(reply.clone());
        }
    }

    Outcome::Reply(execute(state, &name, &args[1..]))
}

fn execute(state: &mut State, name: &str, args: &[String]) -> Frame {
    match (name, args) {
        ("PING", _) => Frame::SimpleString(b"PONG".to_vec()),
        ("AUTH", [_]) | ("SELECT", [_]) | ("ASKING", []) => ok(),
        ("CLUSTER", [sub]) if sub.eq_ignore_ascii_case("SLOTS") => {
            let slots = if state.slots.is_empty() {
                vec![(0, 16383, state.address.clone())]
            } else {
                state.slots.clone()
            };
            Frame::Array(
                slots
                    .iter()
                    .map(|(start, end, address)| {
                        Frame::Array(vec![
                            Frame::Integer(*start as i64),
                            Frame::Integer(*end as i64),
                            node_frame(address),
                        ])
                    })
                    .collect(),
            )
        }
        ("GET", [key]) => bulk(state.strings.get(key)),
        ("SET", [key, value, rest @ ..]) => {
            state.strings.insert(key.clone(), value.clone());
            match rest {
                [ex, secs] if ex.eq_ignore_ascii_case("EX") => {
                    state.ttls.insert(key.clone(), secs.parse().unwrap_or(0));
                }
                _ => {
                    state.ttls.remove(key);
                }
            }
            ok()
        }
        ("DEL", keys) if !keys.is_empty() => {
            let mut removed = 0;
            for key in keys {
                let string = state.strings.remove(key).is_some();
                let hash = state.hashes.remove(key).is_some();
                state.ttls.remove(key);
                if string || hash {
                    removed += 1;
                }
            }
            Frame::Integer(removed)
        }
        ("EXPIRE", [key, secs]) => {
            if state.strings.contains_key(key) || state.hashes.contains_key(key) {
                state.ttls.insert(key.clone(), secs.parse().unwrap_or(0));
                Frame::Integer(1)
            } else {
                Frame::Integer(0)
            }
        }
        ("TTL", [key]) => match state.ttls.get(key) {
            Some(ttl) => Frame::Integer(*ttl as i64),
            None if state.strings.contains_key(key) || state.hashes.contains_key(key) => {
                Frame::Integer(-1)
            }
            None => Frame::Integer(-2),
        },
        ("HSET", [key, pairs @ ..]) | ("HMSET", [key, pairs @ ..])
            if !pairs.is_empty() && pairs.len() % 2 == 0 =>
        {
            let hash = state.hashes.entry(key.clone()).or_default();
            let mut created = 0;
            for pair in pairs.chunks(2) {
                if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    created += 1;
                }
            }
            if name == "HMSET" {
                ok()
            } else {
                Frame::Integer(created)
            }
        }
        ("HGET", [key, field]) => bulk(state.hashes.get(key).and_then(|h| h.get(field))),
        ("HMGET", [key, fields @ ..]) if !fields.is_empty() => {
            let hash = state.hashes.get(key);
            Frame::Array(
                fields
                    .iter()
                    .map(|f| bulk(hash.and_then(|h| h.get(f))))
                    .collect(),
            )
        }
        _ => err(&format!("ERR unknown command or wrong arguments for '{}'", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::{self, Cmd};

    #[tokio::test]
    async fn test_mock_serves_strings_and_hashes() {
        let node = MockNode::start().await;
        let mut conn = Connection::dial(node.address(), &[]).await.unwrap();

        assert_eq!(
            conn.send(command::set_ex("k", "v", 10)).await.unwrap(),
            ok()
        );
        assert_eq!(conn.send(command::get("k")).await.unwrap(), Frame::bulk("v"));
        assert_eq!(node.ttl("k"), Some(10));

        assert_eq!(
            conn.send(command::hset("h", "f", "1")).await.unwrap(),
            Frame::Integer(1)
        );
        assert_eq!(
            conn.send(command::hset("h", "f", "2")).await.unwrap(),
            Frame::Integer(0)
        );
        assert_eq!(node.hash_field("h", "f").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_mock_faults_skip_control_commands() {
        let node = MockNode::start().await;
        node.push_fault(Fault::Reply(Frame::Integer(2)));
        let mut conn = Connection::dial(node.address(), &[]).await.unwrap();

        assert_eq!(
            conn.send(command::ping()).await.unwrap(),
            Frame::SimpleString(b"PONG".to_vec())
        );
        assert_eq!(
            conn.send(command::get("k")).await.unwrap(),
            Frame::Integer(2)
        );
        assert_eq!(
            conn.send(command::get("k")).await.unwrap(),
            Frame::BulkString(None)
        );
        assert_eq!(node.command_count("get"), 2);
    }

    #[tokio::test]
    async fn test_mock_cluster_splits_slots() {
        let nodes = MockNode::start_cluster(3).await;
        let mut conn = Connection::dial(nodes[1].address(), &[]).await.unwrap();
        match conn.send(Cmd::new("CLUSTER").arg("SLOTS")).await.unwrap() {
            Frame::Array(ranges) => assert_eq!(ranges.len(), 3),
            other => panic!("expected array, got {:?}", other),
        }
    }
}
