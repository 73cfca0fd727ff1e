//! Client for a remote quantitative research service.
//!
//! Projects are created or attached through a [`catalog::Catalog`], given source with
//! [`project::Project::update`], compiled, and backtested. Backtests run remotely and
//! asynchronously; [`backtest::Backtest::wait`] polls until the service reports a processing time.
//!
//! ```no_run
//! # async fn run() -> qcapi::Result<()> {
//! use std::sync::Arc;
//! use qcapi::{ApiClient, BacktestRequest, Catalog, File, WaitOptions};
//!
//! let catalog = Catalog::new(Arc::new(ApiClient::new("1234", "token")));
//! let project = catalog.create_project("momentum").await?;
//! project.update(&[File::new("main.py", "...")]).await?;
//! let backtest = project.backtest(BacktestRequest::new()).await?;
//! let result = backtest.wait(&WaitOptions::default()).await?;
//! println!("{}", result["processingTime"]);
//! # Ok(())
//! # }
//! ```
pub mod backtest;
pub mod catalog;
pub mod client;
pub mod compile;
pub mod config;
pub mod error;
pub mod local;
pub mod logging;
pub mod names;
pub mod project;
pub mod server;
pub mod transport;

pub use backtest::{Backtest, BacktestId, BacktestStatus, WaitOptions};
pub use catalog::Catalog;
pub use client::{ApiClient, ApiClientBuilder};
pub use compile::{Compile, CompileId};
pub use config::Config;
pub use error::{Error, Result};
pub use project::{BacktestRequest, File, Project, ProjectId};
pub use transport::{Credentials, HttpTransport, Transport};
