//! RFC 1413 identd companion (spec.md §1, §4.4 "local port... cached so
//! identd can correlate"; SPEC_FULL.md "Identd companion").
//!
//! Started only when `identd_port` is configured. Every [`Bridge`]'s IRC
//! connections register their local port/nick pair into the shared
//! [`IdentTable`] as they connect, change nick, and disconnect; this
//! listener just answers queries against that table.
//!
//! [`Bridge`]: crate::bridge::Bridge

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Maps a local TCP port (one per live IRC connection) to the nick
/// currently registered on it.
pub type IdentTable = Arc<Mutex<HashMap<u16, String>>>;

/// Creates an empty, shareable table.
pub fn new_table() -> IdentTable {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Accepts connections on `port` forever, answering one query per
/// connection and then closing it, per RFC 1413 §4.
pub async fn run(port: u16, table: IdentTable) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("could not bind identd listener on port {port}: {e}");
            return;
        }
    };
    log::info!("identd listening on port {port}");

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("identd accept failed: {e}");
                continue;
            }
        };
        let table = table.clone();
        tokio::spawn(async move {
            if let Err(e) = answer_one(stream, &table).await {
                log::debug!("identd connection error: {e}");
            }
        });
    }
}

async fn answer_one(stream: tokio::net::TcpStream, table: &IdentTable) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = build_response(line.trim(), table);
    write_half.write_all(response.as_bytes()).await?;
    write_half.flush().await
}

/// Parses a `<port1>, <port2>` query and renders the RFC 1413 response
/// line, looking `port1` (the server-local port, the one we connected
/// from) up in `table`.
fn build_response(query: &str, table: &IdentTable) -> String {
    let Some((port1_str, port2_str)) = query.split_once(',') else {
        return format!("{query} : ERROR : INVALID-PORT\r\n");
    };
    let (Ok(port1), Ok(port2)) = (port1_str.trim().parse::<u16>(), port2_str.trim().parse::<u16>()) else {
        return format!("{query} : ERROR : INVALID-PORT\r\n");
    };

    let nick = table.lock().unwrap_or_else(|p| p.into_inner()).get(&port1).cloned();
    match nick {
        Some(nick) => format!("{port1}, {port2} : USERID : UNIX : {nick}\r\n"),
        None => format!("{port1}, {port2} : ERROR : NO-USER\r\n"),
    }
}
