use crate::channel::{ControlChannel, ControlEvent, SimulationState};
use crate::error::{ControlError, Result};
use crate::message::ControlReply;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// Why the driver stopped reading input
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    EndOfInput,
}

/// Feeds newline-delimited control messages into a channel and writes one
/// JSON reply per message
pub struct Driver {
    channel: ControlChannel,
}

impl Driver {
    pub fn new(channel: ControlChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &ControlChannel {
        &self.channel
    }

    /// Apply one input line. Blank lines produce no reply.
    pub async fn handle_line(&self, line: &str) -> Option<ControlReply> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let reply = match self.channel.apply_json(line).await {
            Ok(state) => ControlReply::accepted(state),
            Err(e) => ControlReply::rejected(self.channel.state(), &e),
        };
        Some(reply)
    }

    /// Run until end of input or SIGINT/SIGTERM
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<i32>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let shutdown_receiver = setup_signal_handlers();
        self.run_until(input, output, async move {
            shutdown_receiver
                .await
                .unwrap_or_else(|_| ShutdownReason::Signal("handler dropped".to_string()))
        })
        .await
    }

    /// Run until end of input or until `shutdown` resolves
    pub async fn run_until<R, W, S>(&self, input: R, mut output: W, shutdown: S) -> Result<i32>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ShutdownReason>,
    {
        info!("Reading control messages");
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(reply) = self.handle_line(&line).await {
                            let rendered = serde_json::to_string(&reply)?;
                            output.write_all(rendered.as_bytes()).await?;
                            output.write_all(b"\n").await?;
                            output.flush().await?;
                        }
                    }
                    None => break ShutdownReason::EndOfInput,
                },
                reason = &mut shutdown => {
                    self.request_shutdown().await;
                    break reason;
                }
            }
        };

        info!("Stopped reading input: {:?}", reason);

        if self.channel.state() == SimulationState::ShuttingDown {
            info!("Waiting for drain to finish");
            self.channel.wait_terminated().await;
        }

        info!("Final simulation state: {}", self.channel.state());
        Ok(0)
    }

    /// Shut the simulation down if it is running or paused
    async fn request_shutdown(&self) {
        loop {
            match self.channel.apply(ControlEvent::shutdown()).await {
                Ok(state) => info!("Shutdown requested, simulation is {}", state),
                Err(ControlError::Busy { waited }) => {
                    warn!("Channel busy for {:?}, retrying shutdown", waited);
                    continue;
                }
                Err(ControlError::InvalidTransition { state, .. }) => {
                    debug!("No shutdown needed while simulation is {}", state)
                }
                Err(ControlError::AlreadyTerminated) => debug!("Simulation already terminated"),
                Err(e) => warn!("Shutdown request failed: {}", e),
            }
            return;
        }
    }
}

/// Set up SIGINT/SIGTERM handlers that resolve the returned receiver once
fn setup_signal_handlers() -> oneshot::Receiver<ShutdownReason> {
    let (shutdown_sender, shutdown_receiver) = oneshot::channel();
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    // Handle SIGTERM - Unix only
    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM signal");
                if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });

    shutdown_receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ControlChannelBuilder;
    use crate::drain::DelayDrainer;
    use crate::message::ControlMessage;
    use std::time::Duration;

    fn create_driver() -> Driver {
        Driver::new(ControlChannelBuilder::new().build().unwrap())
    }

    fn replies(output: &[u8]) -> Vec<ControlReply> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_driver_replies_per_message() {
        let driver = create_driver();
        let input = format!(
            "{}\n\n{}\nnonsense\n{}\n",
            ControlMessage::start().to_wire_string(),
            ControlMessage::start().to_wire_string(),
            ControlMessage::pause().to_wire_string(),
        );
        let mut output = Vec::new();

        let code = driver
            .run_until(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();
        assert_eq!(code, 0);

        let replies = replies(&output);
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], ControlReply::accepted(SimulationState::Running));
        assert!(!replies[1].ok);
        assert_eq!(replies[1].error.as_ref().unwrap().kind, "invalid_transition");
        assert_eq!(replies[2].error.as_ref().unwrap().kind, "malformed_event");
        assert_eq!(replies[2].state, SimulationState::Running);
        assert_eq!(replies[3], ControlReply::accepted(SimulationState::Paused));
    }

    #[tokio::test]
    async fn test_driver_waits_for_drain_at_end_of_input() {
        let channel = ControlChannelBuilder::new()
            .drainer(DelayDrainer::new(Duration::from_millis(50)))
            .build()
            .unwrap();
        let driver = Driver::new(channel);
        let input = format!(
            "{}\n{}\n",
            ControlMessage::start().to_wire_string(),
            ControlMessage::shutdown().to_wire_string(),
        );
        let mut output = Vec::new();

        driver
            .run_until(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        let replies = replies(&output);
        assert_eq!(replies[1], ControlReply::accepted(SimulationState::ShuttingDown));
        assert_eq!(driver.channel().state(), SimulationState::Terminated);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_running_simulation() {
        let driver = create_driver();
        driver.channel().apply(ControlEvent::start()).await.unwrap();

        let (reader, _writer) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);
        let mut output = Vec::new();

        driver
            .run_until(reader, &mut output, async {
                ShutdownReason::Signal("test".to_string())
            })
            .await
            .unwrap();

        assert!(output.is_empty());
        assert_eq!(driver.channel().state(), SimulationState::Terminated);
    }

    #[tokio::test]
    async fn test_shutdown_request_retries_while_busy() {
        let mut config = crate::config::SimctlConfig::default();
        config.channel.lock_timeout_ms = 20;
        let driver = Driver::new(ControlChannelBuilder::new().config(config).build().unwrap());
        driver.channel().apply(ControlEvent::start()).await.unwrap();

        let holder = driver.channel().clone();
        let (locked_tx, locked_rx) = oneshot::channel();
        let release = tokio::spawn(async move {
            let guard = holder.hold_lock().await;
            let _ = locked_tx.send(());
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(guard);
        });
        locked_rx.await.unwrap();

        driver.request_shutdown().await;
        release.await.unwrap();

        assert_ne!(driver.channel().state(), SimulationState::Running);
        assert!(driver.channel().stats().events_rejected >= 1);
        tokio::time::timeout(Duration::from_secs(5), driver.channel().wait_terminated())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_signal_when_stopped_exits_cleanly() {
        let driver = create_driver();
        let (reader, _writer) = tokio::io::duplex(64);

        driver
            .run_until(
                tokio::io::BufReader::new(reader),
                tokio::io::sink(),
                async { ShutdownReason::Signal("test".to_string()) },
            )
            .await
            .unwrap();

        assert_eq!(driver.channel().state(), SimulationState::Stopped);
    }
}
