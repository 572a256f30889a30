//! TCP accept loop and per-connection frame delivery.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use squeeze_proto::{Cancel, Config, Transfer};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::conn::FrameReceiver;
use crate::error::{Error, Result};

/// Pause after the first failed accept; doubles per consecutive failure.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between failed accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Callback receiving each message body with its sender's address.
pub type Handler = Arc<dyn Fn(SocketAddr, Vec<u8>) + Send + Sync>;

/// What the server does with each received frame.
#[derive(Clone)]
#[non_exhaustive]
pub enum Mode {
    /// Hands each body to a callback.
    Messages(Handler),
    /// Saves each body as `<dir>/<ip>-<port>-<seq>.bin`.
    Files {
        /// Target directory; created on start.
        dir: PathBuf,
    },
}

impl Mode {
    /// Messages mode from a closure.
    pub fn messages(f: impl Fn(SocketAddr, Vec<u8>) + Send + Sync + 'static) -> Self {
        Self::Messages(Arc::new(f))
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Messages(_) => f.write_str("Messages"),
            Self::Files { dir } => f.debug_struct("Files").field("dir", dir).finish(),
        }
    }
}

/// A bound listener.
#[derive(Debug)]
pub struct Server {
    /// Accepting socket.
    listener: TcpListener,
    /// Validated frame settings shared by every connection.
    transfer: Transfer,
}

impl Server {
    /// Validates `config` and binds `addr`.
    pub async fn bind(addr: impl ToSocketAddrs, config: Config) -> Result<Self> {
        let transfer = Transfer::new(config)?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, transfer })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `cancel` fires, then waits for open
    /// connections to stop.
    ///
    /// Each connection runs in its own task; one failing connection never
    /// affects the others.
    pub async fn run(self, mode: Mode, cancel: Cancel) -> Result<()> {
        if let Mode::Files { dir } = &mode {
            tokio::fs::create_dir_all(dir).await?;
        }
        info!(addr = %self.local_addr()?, ?mode, "listening");

        let transfer = self.transfer.with_cancel(cancel.clone());
        let mut sessions = JoinSet::new();
        let mut failures = 0u32;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => {
                            failures = 0;
                            a
                        }
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            let pause = accept_backoff(failures);
                            warn!(error = %e, ?pause, "accept failed");
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => break,
                                () = tokio::time::sleep(pause) => continue,
                            }
                        }
                    };
                    let (transfer, mode) = (transfer.clone(), mode.clone());
                    sessions.spawn(async move {
                        match session(stream, peer, transfer, &mode).await {
                            Ok(frames) => info!(%peer, frames, "peer disconnected"),
                            Err(e) => warn!(%peer, error = %e, "session ended"),
                        }
                    });
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        while sessions.join_next().await.is_some() {}
        info!("server stopped");
        Ok(())
    }
}

/// Wait before retrying after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Receives frames from one peer until it disconnects.
async fn session(
    stream: TcpStream,
    peer: SocketAddr,
    transfer: Transfer,
    mode: &Mode,
) -> Result<u64> {
    debug!(%peer, "accepted");
    let mut rx = FrameReceiver::new(BufReader::new(stream), transfer);
    let mut seq = 0u64;
    loop {
        let outcome = match mode {
            Mode::Messages(handler) => rx.recv().await.map(|body| body.map(|b| handler(peer, b))),
            Mode::Files { dir } => {
                let dest = dir.join(format!("{}-{}-{seq}.bin", peer.ip(), peer.port()));
                rx.recv_file(&dest).await.map(|r| {
                    r.map(|r| debug!(%peer, path = %dest.display(), bytes = r.delivered, "saved"))
                })
            }
        };
        match outcome {
            Ok(Some(())) => seq += 1,
            Ok(None) => return Ok(seq),
            Err(e) if !e.is_fatal() => {
                warn!(%peer, error = %e, "frame dropped");
                seq += 1;
            }
            Err(Error::Proto(squeeze_proto::Error::Cancelled)) => return Ok(seq),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::client::Client;

    async fn start(mode: Mode) -> (SocketAddr, Cancel, tokio::task::JoinHandle<Result<()>>) {
        let server = Server::bind("127.0.0.1:0", Config::default()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = Cancel::new();
        let task = tokio::spawn(server.run(mode, cancel.clone()));
        (addr, cancel, task)
    }

    #[test]
    fn accept_backoff_doubles_up_to_cap() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(8), Duration::from_secs(1));
        assert_eq!(accept_backoff(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn messages_arrive_in_order_over_tcp() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut done) = tokio::sync::mpsc::unbounded_channel();
        let sink = Arc::clone(&seen);
        let (addr, cancel, server) = start(Mode::messages(move |_, body| {
            sink.lock().unwrap().push(body);
            tx.send(()).ok();
        }))
        .await;

        let client = Client::connect(addr, Config::default(), 4, Cancel::new())
            .await
            .unwrap();
        let beta = "beta ".repeat(1_000);
        let texts = ["alpha", beta.as_str(), "γ"];
        for t in texts {
            client.enqueue(t).await.unwrap();
        }
        assert_eq!(client.finish().await.unwrap(), 3);

        for _ in 0..3 {
            done.recv().await.unwrap();
        }
        cancel.cancel();
        server.await.unwrap().unwrap();

        let got = seen.lock().unwrap().clone();
        let want: Vec<Vec<u8>> = texts.iter().map(|t| t.as_bytes().to_vec()).collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn files_mode_saves_each_frame() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.log");
        std::fs::write(&src, "log line\n".repeat(5_000)).unwrap();
        let out = dir.path().join("received");

        let (addr, cancel, server) = start(Mode::Files { dir: out.clone() }).await;
        let client = Client::connect(addr, Config::default(), 2, Cancel::new())
            .await
            .unwrap();
        client.enqueue("first").await.unwrap();
        client.send_file(&src).await.unwrap();
        assert_eq!(client.finish().await.unwrap(), 2);

        let mut saved = Vec::new();
        for _ in 0..200 {
            saved = std::fs::read_dir(&out)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok().map(|e| e.path()))
                        .filter(|p| p.extension().is_some_and(|x| x == "bin"))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            if saved.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        saved.sort_by_key(|p| p.to_string_lossy().ends_with("-1.bin"));
        assert_eq!(saved.len(), 2);
        assert_eq!(std::fs::read(&saved[0]).unwrap(), b"first");
        assert_eq!(std::fs::read(&saved[1]).unwrap(), std::fs::read(&src).unwrap());

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn broken_peer_does_not_affect_others() {
        let (tx, mut done) = tokio::sync::mpsc::unbounded_channel();
        let (addr, cancel, server) = start(Mode::messages(move |_, body| {
            tx.send(body).ok();
        }))
        .await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&[0, 0, 0, 0]).await.unwrap();

        let client = Client::connect(addr, Config::default(), 1, Cancel::new())
            .await
            .unwrap();
        client.enqueue("still fine").await.unwrap();
        client.finish().await.unwrap();

        assert_eq!(done.recv().await.unwrap(), b"still fine");
        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_stops_server_with_idle_peer() {
        let (addr, cancel, server) = start(Mode::messages(|_, _| {})).await;
        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
