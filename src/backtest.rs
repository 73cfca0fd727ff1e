use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use crate::client::{field, ApiClient};
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::transport::{HttpTransport, Transport};

pub type BacktestId = String;

/// Value of `processingTime` while a backtest is still running.
pub const PENDING: &str = "-1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BacktestStatus {
    Pending,
    Complete,
}

impl BacktestStatus {
    /// Pending only when `processingTime` is the string `"-1"`. Any other value, including a
    /// number or null, is complete. Whether the run itself succeeded is left to the caller.
    pub fn of(result: &Value) -> Result<Self> {
        match field(result, "backtests/read", "processingTime")? {
            Value::String(time) if time == PENDING => Ok(BacktestStatus::Pending),
            _ => Ok(BacktestStatus::Complete),
        }
    }
}

/// How [`Backtest::wait`] polls. Every limit is off by default, in which case waiting only ends
/// when the backtest completes or a read fails.
#[derive(Clone, Debug)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
    /// Waiting stops once `true` is observed. Checked before each read and during each sleep.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl WaitOptions {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_attempts: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Handle on a remote backtest job. Job state is never cached: each [`Backtest::read`] asks the
/// service again.
pub struct Backtest<T = HttpTransport> {
    pub id: BacktestId,
    client: Arc<ApiClient<T>>,
    logger: Logger,
}

impl<T> Clone for Backtest<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            client: Arc::clone(&self.client),
            logger: self.logger.clone(),
        }
    }
}

impl<T> fmt::Debug for Backtest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backtest").field("id", &self.id).finish()
    }
}

impl<T> Backtest<T> {
    pub fn new(client: Arc<ApiClient<T>>, id: impl Into<BacktestId>) -> Self {
        let logger = client.logger().with_target("qcapi::backtest");
        Self {
            id: id.into(),
            client,
            logger,
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|stop| *stop).await.is_err();
    if closed {
        // Sender gone without cancelling: nothing can cancel any more.
        std::future::pending::<()>().await
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

impl<T: Transport> Backtest<T> {
    /// One poll. Returns whatever the service reports, pending or not.
    pub async fn read(&self) -> Result<Value> {
        self.client
            .perform("backtests/read", json!({ "backtestId": self.id }))
            .await
    }

    /// Polls until the backtest completes and returns the completing read unmodified.
    ///
    /// Sleeps `poll_interval` between reads and not after the last one. Read errors end the wait
    /// immediately. Limits and cancellation in `options` are checked between reads only. A
    /// `max_attempts` of zero fails without reading.
    pub async fn wait(&self, options: &WaitOptions) -> Result<Value> {
        let started = Instant::now();
        let mut cancel = options.cancel.clone();
        let mut attempts: u32 = 0;

        if options.max_attempts == Some(0) {
            return Err(Error::WaitExhausted { attempts });
        }

        loop {
            if is_cancelled(&cancel) {
                return Err(Error::Cancelled);
            }

            let result = self.read().await?;
            attempts += 1;
            let status = BacktestStatus::of(&result)?;
            self.logger.debug(format_args!(
                "BACKTEST: Progress: {}",
                result["processingTime"]
            ));
            if status == BacktestStatus::Complete {
                return Ok(result);
            }

            if options.max_attempts.is_some_and(|max| attempts >= max) {
                self.logger.warn(format_args!(
                    "BACKTEST: {} still pending after {} reads",
                    self.id, attempts
                ));
                return Err(Error::WaitExhausted { attempts });
            }

            let mut pause = options.poll_interval;
            if let Some(timeout) = options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(Error::WaitTimeout { elapsed });
                }
                pause = pause.min(timeout - elapsed);
            }

            match cancel.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = sleep(pause) => {}
                        _ = cancelled(rx) => return Err(Error::Cancelled),
                    }
                }
                None => sleep(pause).await,
            }

            if let Some(timeout) = options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    self.logger.warn(format_args!(
                        "BACKTEST: {} still pending after {:?}",
                        self.id, elapsed
                    ));
                    return Err(Error::WaitTimeout { elapsed });
                }
            }
        }
    }

    pub async fn delete(&self) -> Result<()> {
        self.client
            .perform("backtests/delete", json!({ "backtestId": self.id }))
            .await?;
        self.logger
            .info(format_args!("BACKTEST: Deleted backtest {}", self.id));
        Ok(())
    }
}
