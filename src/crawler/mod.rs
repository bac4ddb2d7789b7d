//! Crawler module: the crawl session and its workers
//!
//! This module contains the session orchestration logic, including:
//! - The `CrawlController` and its monitor
//! - The worker contracts and the default HTTP worker
//! - HTTP fetching and HTML link extraction
//! - Seed bookkeeping and seed admission hooks

mod controller;
mod fetcher;
mod http_worker;
mod monitor;
mod observer;
mod parser;
mod quiescence;
mod seeds;
mod worker;

pub use controller::{CrawlController, SessionStatus};
pub use fetcher::{build_http_client, FetchOutcome, PageFetcher};
pub use http_worker::{HttpWorker, Page, PageVisitor, WorkerStats};
pub use observer::{IgnoreSeedEvents, SeedEventObserver};
pub use parser::{parse_html, HtmlPage, OutLink};
pub use quiescence::{DelayedDoubleCheck, PoolProbe, QuiescenceDetector};
pub use seeds::SeedRegistry;
pub use worker::{DefaultFactory, FetchWorker, SessionHandle, WorkerContext, WorkerFactory};
