use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{ArmDriverConfig, Correlator, WaitTicket};
use crate::packets::{encode_frame, Command, FrameDecoder, ResponseFrame};
use crate::{ArmError, ConnectionState, RobotMode};

/// Persistent session with one arm controller.
///
/// Owns the TCP socket and two background tasks: a sender draining the
/// command queue onto the socket in FIFO order, and a receiver reassembling
/// frames and handing them to the correlator. The socket has a single-writer
/// invariant: routine frames are written only by the sender task, and the
/// immediate path ([`ArmDriver::send_immediate`]) takes the same writer lock
/// so frames are never interleaved on the wire.
///
/// Cloning is cheap; clones share the session.
#[derive(Debug, Clone)]
pub struct ArmDriver {
    config: ArmDriverConfig,
    writer: Arc<Mutex<WriteHalf<TcpStream>>>,
    queue_tx: mpsc::Sender<String>,
    correlator: Arc<Correlator>,
    state: Arc<Mutex<ConnectionState>>,
    mode: Arc<Mutex<RobotMode>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ArmDriver {
    /// Connects to the controller and starts the sender/receiver tasks.
    ///
    /// The initial connect retries up to `config.connect_retries` times with
    /// a fixed `config.retry_delay` between attempts and fails with
    /// [`ArmError::Connection`] once exhausted.
    pub async fn connect(config: ArmDriverConfig) -> Result<Self, ArmError> {
        config.validate()?;
        let addr = config.connection_url();
        let stream =
            connect_with_retries(&addr, config.connect_retries, config.retry_delay).await?;

        let (read_half, write_half) = split(stream);
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_depth);
        let (shutdown_tx, _) = watch::channel(false);

        let driver = Self {
            config,
            writer: Arc::new(Mutex::new(write_half)),
            queue_tx,
            correlator: Arc::new(Correlator::new()),
            state: Arc::new(Mutex::new(ConnectionState::Connected)),
            // The controller boots in SEQ mode; get_robot_mode re-syncs this.
            mode: Arc::new(Mutex::new(RobotMode::Seq)),
            shutdown_tx: Arc::new(shutdown_tx),
        };

        let sender = driver.clone();
        let shutdown_rx = driver.shutdown_tx.subscribe();
        tokio::spawn(async move { sender.send_loop(queue_rx, shutdown_rx).await });

        let receiver = driver.clone();
        let shutdown_rx = driver.shutdown_tx.subscribe();
        tokio::spawn(async move { receiver.read_loop(read_half, shutdown_rx).await });

        info!(%addr, "connected to arm controller");
        Ok(driver)
    }

    /// Scoped per-call variant: open, send one frame, read one response,
    /// close. The socket is dropped on every exit path. Simple, but unsafe
    /// for concurrent callers; use a persistent [`ArmDriver`] when
    /// correlation or emergency commands share the channel.
    pub async fn oneshot_call(
        config: &ArmDriverConfig,
        command: Command,
    ) -> Result<ResponseFrame, ArmError> {
        config.validate()?;
        let addr = config.connection_url();
        let mut stream =
            connect_with_retries(&addr, config.connect_retries, config.retry_delay).await?;

        let frame = encode_frame(&command)?;
        stream
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| ArmError::Send { command: command.name().into(), reason: e.to_string() })?;

        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 2048];
        let response = timeout(config.response_timeout, async {
            loop {
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| ArmError::Protocol(format!("read failed: {e}")))?;
                if n == 0 {
                    return Err(ArmError::NotConnected(ConnectionState::Failed));
                }
                decoder.extend(&buf[..n]);
                if let Some(line) = decoder.next_frame() {
                    return serde_json::from_str::<ResponseFrame>(&line)
                        .map_err(|e| ArmError::Protocol(format!("undecodable frame `{line}`: {e}")));
                }
            }
        })
        .await
        .map_err(|_| ArmError::CorrelationTimeout {
            command: command.name().into(),
            timeout: config.response_timeout,
        })??;

        Ok(response)
    }

    /// Enqueues a command and waits for its correlated response.
    ///
    /// The waiter is registered before the frame is enqueued; a response
    /// cannot arrive before someone is waiting for it. The wait is bounded by
    /// `config.response_timeout` and also observes session shutdown.
    pub async fn call(&self, command: Command) -> Result<ResponseFrame, ArmError> {
        self.ensure_connected().await?;
        let frame = encode_frame(&command)?;
        let ticket = self.correlator.register(command.name()).await;
        if let Err(e) = self.queue_tx.send(frame).await {
            self.correlator.forget(ticket.id).await;
            return Err(ArmError::Send { command: command.name().into(), reason: e.to_string() });
        }
        self.await_response(command.name(), ticket).await
    }

    /// Writes a command directly, bypassing the queue, for stop and
    /// emergency stop, which must not wait behind queued motion. Takes the
    /// same writer lock as the sender loop, so a frame mid-write is never
    /// interleaved with this one.
    pub async fn send_immediate(&self, command: Command) -> Result<ResponseFrame, ArmError> {
        self.ensure_connected().await?;
        let frame = encode_frame(&command)?;
        let ticket = self.correlator.register(command.name()).await;
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(frame.as_bytes()).await {
                self.correlator.forget(ticket.id).await;
                self.fail().await;
                return Err(ArmError::Send {
                    command: command.name().into(),
                    reason: e.to_string(),
                });
            }
        }
        debug!(frame = frame.trim_end(), "sent (immediate)");
        self.await_response(command.name(), ticket).await
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Last execution mode reported by or commanded on the controller.
    pub async fn mode(&self) -> RobotMode {
        *self.mode.lock().await
    }

    pub(crate) async fn set_mode(&self, mode: RobotMode) {
        *self.mode.lock().await = mode;
    }

    pub fn config(&self) -> &ArmDriverConfig {
        &self.config
    }

    /// Orderly shutdown: both loops stop at their next poll tick and every
    /// pending wait resolves promptly with an error.
    pub async fn shutdown(&self) {
        *self.state.lock().await = ConnectionState::Disconnected;
        let _ = self.shutdown_tx.send(true);
        self.correlator.fail_all().await;
        info!("arm session shut down");
    }

    async fn ensure_connected(&self) -> Result<(), ArmError> {
        match self.state().await {
            ConnectionState::Connected => Ok(()),
            other => Err(ArmError::NotConnected(other)),
        }
    }

    /// Marks the session dead after a mid-session I/O error: state goes to
    /// `Failed`, both loops stop, pending waits resolve with an error, and
    /// subsequent calls fail fast.
    async fn fail(&self) {
        let mut state = self.state.lock().await;
        if *state == ConnectionState::Connected {
            *state = ConnectionState::Failed;
        }
        drop(state);
        let _ = self.shutdown_tx.send(true);
        self.correlator.fail_all().await;
    }

    async fn await_response(
        &self,
        name: &str,
        ticket: WaitTicket,
    ) -> Result<ResponseFrame, ArmError> {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::select! {
            res = timeout(self.config.response_timeout, ticket.rx) => match res {
                Ok(Ok(frame)) => Ok(frame),
                // Waiter dropped without an answer: the session died.
                Ok(Err(_)) => Err(ArmError::NotConnected(self.state().await)),
                Err(_) => {
                    self.correlator.forget(ticket.id).await;
                    Err(ArmError::CorrelationTimeout {
                        command: name.into(),
                        timeout: self.config.response_timeout,
                    })
                }
            },
            _ = shutdown.changed() => {
                self.correlator.forget(ticket.id).await;
                Err(ArmError::NotConnected(self.state().await))
            }
        }
    }

    /// Drains the command queue onto the socket, one frame at a time, in
    /// enqueue order.
    async fn send_loop(&self, mut queue_rx: mpsc::Receiver<String>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let frame = tokio::select! {
                frame = queue_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(frame.as_bytes()).await {
                drop(writer);
                error!(error = %e, "socket write failed, stopping sender");
                self.fail().await;
                break;
            }
            debug!(frame = frame.trim_end(), "sent");
        }
        debug!("sender loop stopped");
    }

    /// Reads raw bytes, reassembles frames and hands each decoded response to
    /// the correlator in arrival order.
    async fn read_loop(&self, mut reader: ReadHalf<TcpStream>, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; 2048];
        let mut decoder = FrameDecoder::new();
        loop {
            let n = tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("controller closed the connection");
                        self.fail().await;
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        error!(error = %e, "socket read failed, stopping receiver");
                        self.fail().await;
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            };
            decoder.extend(&buf[..n]);
            while let Some(line) = decoder.next_frame() {
                debug!(frame = %line, "received");
                match serde_json::from_str::<ResponseFrame>(&line) {
                    Ok(frame) => self.correlator.resolve(frame).await,
                    // Malformed frame: log and keep the session alive.
                    Err(e) => warn!(error = %e, frame = %line, "undecodable frame"),
                }
            }
        }
        debug!("receiver loop stopped");
    }
}

async fn connect_with_retries(
    addr: &str,
    retries: u32,
    delay: Duration,
) -> Result<TcpStream, ArmError> {
    let mut last_err: Option<io::Error> = None;
    for attempt in 1..=retries {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!(%addr, attempt, error = %e, "connect attempt failed");
                last_err = Some(e);
                if attempt < retries {
                    sleep(delay).await;
                }
            }
        }
    }
    Err(ArmError::Connection {
        addr: addr.to_string(),
        attempts: retries,
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no connect attempts made")),
    })
}
