//! # pingpong - evloop demo server and client
//!
//! Line protocol over TCP: the server answers `ping` with `pong` and
//! closes the connection on `exit`. Everything the library offers is on
//! display: a loop pool, an accepting channel, buffered connections, a
//! repeating heartbeat timer and a startup job.
//!
//! ## Usage
//!
//!     cargo run -p pingpong --release -- --server [--port 14317] [--loops 4]
//!     cargo run -p pingpong --release -- --client 127.0.0.1 [--port 14317]
//!
//! Server console commands: `stats`, `exit`. Client console: type lines,
//! `exit` to quit. `EVLOOP_LOG=debug` turns on reactor logging.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evloop::{
    edebug, eerror, einfo, ewarn, BytePipe, Channel, ConnectionHandler, LoopPool, ReactorConfig,
    ReadOutcome, TcpConnection, TcpServer, TimerKind,
};

// ── Configuration ──

const DEFAULT_PORT: u16 = 14317;
const LISTEN_BACKLOG: i32 = 1000;
const HEARTBEAT_MS: u64 = 5000;

static TOTAL_CONNECTIONS: AtomicU64 = AtomicU64::new(0);
static ACTIVE_CONNECTIONS: AtomicU64 = AtomicU64::new(0);
static TOTAL_PINGS: AtomicU64 = AtomicU64::new(0);

// ── Protocol handler ──

/// One shared handler serves every connection; all state lives in the
/// per-channel pipes and the global counters.
struct PingPong;

impl PingPong {
    fn next_line(pipe: &mut BytePipe) -> Option<Vec<u8>> {
        let pos = pipe.find_byte(b'\n')?;
        let mut line = vec![0u8; pos + 1];
        pipe.read(&mut line);
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

impl ConnectionHandler for PingPong {
    fn on_read(&self, conn: &Arc<TcpConnection>) -> ReadOutcome {
        loop {
            let line = {
                let mut pipe = conn.channel().recv_pipe().lock().unwrap();
                Self::next_line(&mut pipe)
            };
            // Bytes after the last newline stay queued for the next event.
            let Some(line) = line else { return ReadOutcome::Continue };
            match line.as_slice() {
                b"ping" => {
                    TOTAL_PINGS.fetch_add(1, Ordering::Relaxed);
                    if conn.send(b"pong\n").is_err() {
                        return ReadOutcome::Error;
                    }
                }
                b"exit" => {
                    conn.close();
                    return ReadOutcome::AlreadyClosed;
                }
                other => {
                    ewarn!(
                        "fd {}: ignoring {:?}",
                        conn.fd(),
                        String::from_utf8_lossy(other)
                    );
                }
            }
        }
    }

    fn on_close(&self, conn: &Arc<TcpConnection>) {
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        edebug!("fd {}: connection done", conn.fd());
    }
}

// ── Server ──

fn server_main(port: u16, loops: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = ReactorConfig::from_env().name_prefix("pp");
    let pool = Arc::new(LoopPool::with_config(loops, config)?);

    let server = TcpServer::open(Ipv4Addr::UNSPECIFIED, port, LISTEN_BACKLOG)?;
    let bound = server.local_port()?;
    let listener = server.into_channel();

    let accept_pool = pool.clone();
    listener.set_read_proc(Some(Arc::new(move |ch: &Channel| {
        loop {
            match evloop::sys::accept(ch.fd()) {
                Ok(Some((fd, peer))) => {
                    let handle = accept_pool.next().handle();
                    match TcpConnection::attach(fd, &handle, Arc::new(PingPong)) {
                        Ok(conn) => {
                            TOTAL_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
                            ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
                            edebug!("fd {}: accepted {} on {}", conn.fd(), peer, handle.name());
                        }
                        Err(e) => ewarn!("attach failed for {}: {}", peer, e),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    ewarn!("accept failed: {}", e);
                    break;
                }
            }
        }
        0
    })));
    pool.get(0).unwrap().add_channel(listener.clone())?;

    // Heartbeat on loop 0. Counters are global, so no pool capture.
    pool.get(0).unwrap().add_timer(
        Duration::from_millis(HEARTBEAT_MS),
        TimerKind::Repeating,
        |handle, _id| {
            einfo!(
                "heartbeat on {}: active={} total={} pings={}",
                handle.name(),
                ACTIVE_CONNECTIONS.load(Ordering::Relaxed),
                TOTAL_CONNECTIONS.load(Ordering::Relaxed),
                TOTAL_PINGS.load(Ordering::Relaxed)
            );
        },
    );

    pool.get(0)
        .unwrap()
        .add_job(|handle| einfo!("{} ready", handle.name()));

    einfo!(
        "pingpong server on port {} with {} loop(s); console: stats, exit",
        bound,
        pool.len()
    );

    // Console loop owns the main thread until exit or EOF.
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eerror!("stdin read failed: {}", e);
                break;
            }
        }
        match line.trim() {
            "exit" | "quit" => break,
            "stats" => eprintln!(
                "active={} total={} pings={}",
                ACTIVE_CONNECTIONS.load(Ordering::Relaxed),
                TOTAL_CONNECTIONS.load(Ordering::Relaxed),
                TOTAL_PINGS.load(Ordering::Relaxed)
            ),
            "" => {}
            other => eprintln!("unknown command {:?} (try stats, exit)", other),
        }
    }

    einfo!("shutting down");
    pool.get(0).unwrap().remove_channel(&listener);
    listener.set_read_proc(None);
    drop(listener);
    if let Ok(mut pool) = Arc::try_unwrap(pool) {
        pool.shutdown();
    }
    Ok(())
}

// ── Client ──

fn client_main(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };

    let mut stream = TcpStream::connect(&addr)?;
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    eprintln!("connected to {}; type lines, exit to quit", addr);

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        eprint!("> ");
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                let _ = stream.write_all(b"exit\n");
                break;
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        if line.trim().is_empty() {
            continue;
        }
        if !line.ends_with('\n') {
            line.push('\n');
        }
        stream.write_all(line.as_bytes())?;
        let quitting = line.trim() == "exit";

        let mut reply = String::new();
        match reader.read_line(&mut reply) {
            Ok(0) => {
                eprintln!("server closed the connection");
                break;
            }
            Ok(_) => print!("{}", reply),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // No reply to this line; that is allowed.
            }
            Err(e) => return Err(e.into()),
        }
        if quitting {
            // Drain whatever the server sends before the close lands.
            let mut rest = Vec::new();
            let _ = reader.read_to_end(&mut rest);
            break;
        }
    }
    Ok(())
}

// ── Main ──

enum Mode {
    Server,
    Client(String),
}

fn print_usage() {
    eprintln!("usage: pingpong [--server] [--client HOST[:PORT]] [--port PORT] [--loops N]");
    eprintln!("  --server, -s          run the server (default)");
    eprintln!("  --client, -c HOST     run the interactive client");
    eprintln!("  --port, -p PORT       port to listen on / connect to (default {})", DEFAULT_PORT);
    eprintln!("  --loops, -l N         event loops in the pool (0 = EVLOOP_LOOPS or default)");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut mode = Mode::Server;
    let mut port: u16 = DEFAULT_PORT;
    let mut loops: usize = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => mode = Mode::Server,
            "--client" | "-c" => {
                i += 1;
                match args.get(i) {
                    Some(host) => mode = Mode::Client(host.clone()),
                    None => {
                        print_usage();
                        std::process::exit(2);
                    }
                }
            }
            "--port" | "-p" => {
                i += 1;
                if let Some(p) = args.get(i).and_then(|s| s.parse().ok()) {
                    port = p;
                }
            }
            "--loops" | "-l" => {
                i += 1;
                if let Some(n) = args.get(i).and_then(|s| s.parse().ok()) {
                    loops = n;
                }
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            s if s.parse::<u16>().is_ok() => port = s.parse().unwrap(),
            other => {
                eprintln!("pingpong: unknown argument {:?}", other);
                print_usage();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    evloop::init();

    let outcome = match mode {
        Mode::Server => server_main(port, loops),
        Mode::Client(host) => client_main(&host, port),
    };
    if let Err(e) = outcome {
        eerror!("{}", e);
        std::process::exit(1);
    }
}
