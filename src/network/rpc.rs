// src/network/rpc.rs
//! Legacy getwork JSON-RPC client and the work I/O thread
//!
//! All HTTP traffic to the pool funnels through one thread that consumes
//! [`WorkCmd`] messages from its queue: work requests from workers, share
//! submissions, and the shutdown command. The thread is the process
//! liveness root; when it exits it freezes its queue, every other thread
//! unwinds, and `main` returns.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::config::Config;
use crate::miner::algorithm::AlgoCaps;
use crate::miner::work::{MinerState, Work, unix_time};
use crate::stats::ShareStats;
use crate::utils::{CommandQueue, MinerError, Pop, guard};

/// Default reward vote ceiling when the pool does not send one.
const DEFAULT_MAX_VOTE: u32 = 1024;

/// Commands handled by the work I/O thread.
pub enum WorkCmd {
    /// Fetch fresh work and deliver it on the requester's reply queue.
    GetWork {
        /// Per-worker reply channel.
        reply: Arc<CommandQueue<Work>>,
    },
    /// Submit a solved share upstream.
    SubmitWork(Box<Work>),
    /// Stop the work I/O thread, unwinding the process.
    Shutdown,
}

/// Tracks consecutive failures against the configured retry budget.
///
/// A negative budget retries forever.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    retries: i32,
    failures: i32,
}

impl RetryBudget {
    /// Creates a budget allowing `retries` consecutive failures.
    pub fn new(retries: i32) -> Self {
        RetryBudget {
            retries,
            failures: 0,
        }
    }

    /// Registers one failure; returns false once the budget is spent.
    pub fn register_failure(&mut self) -> bool {
        self.failures += 1;
        self.retries < 0 || self.failures <= self.retries
    }

    /// Clears the consecutive-failure count after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Blocking JSON-RPC transport for the getwork protocol.
pub struct RpcClient {
    http: Client,
    url: String,
    user: String,
    pass: String,
}

impl RpcClient {
    /// Builds the HTTP client from pool settings.
    pub fn new(cfg: &Config) -> Result<RpcClient, MinerError> {
        Self::with_timeout(cfg, cfg.timeout)
    }

    /// Builds the HTTP client with an explicit request timeout, for
    /// callers whose requests are meant to block server-side.
    pub fn with_timeout(cfg: &Config, timeout: u64) -> Result<RpcClient, MinerError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(timeout));
        if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        Ok(RpcClient {
            http: builder.build()?,
            url: cfg.url.clone(),
            user: cfg.user.clone(),
            pass: cfg.pass.clone(),
        })
    }

    /// Issues one JSON-RPC call and returns the parsed body plus the
    /// long-poll path advertised in the response headers, if any.
    pub fn call(&self, body: &Value) -> Result<(Value, Option<String>), MinerError> {
        self.call_url(&self.url, body)
    }

    /// Like [`RpcClient::call`] against an explicit URL (long-poll).
    pub fn call_url(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<(Value, Option<String>), MinerError> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.user, Some(&self.pass))
            .header("X-Mining-Extensions", "longpoll")
            .json(body)
            .send()?;

        let lp_path = response
            .headers()
            .get("x-long-polling")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let parsed: Value = response.error_for_status()?.json()?;
        if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
            return Err(MinerError::ProtocolError(format!("pool error: {}", err)));
        }
        Ok((parsed, lp_path))
    }
}

/// Decodes a getwork `result` object into a [`Work`] unit.
pub fn work_decode(result: &Value, caps: &AlgoCaps) -> Result<Work, MinerError> {
    let data = hex_field(result, "data")?;
    if data.len() != 128 {
        return Err(MinerError::ProtocolError(format!(
            "work data has {} bytes, expected 128",
            data.len()
        )));
    }
    let target = hex_field(result, "target")?;
    if target.len() != 32 {
        return Err(MinerError::ProtocolError(format!(
            "work target has {} bytes, expected 32",
            target.len()
        )));
    }

    let mut work = Work::default();
    for (i, chunk) in data.chunks_exact(4).enumerate() {
        work.data[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    for (i, chunk) in target.chunks_exact(4).enumerate() {
        work.target[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    if caps.uses_vote {
        work.max_vote = match hex_field(result, "maxvote") {
            Ok(bytes) if bytes.len() == 4 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            _ => DEFAULT_MAX_VOTE,
        };
    }

    Ok(work)
}

fn hex_field(result: &Value, key: &str) -> Result<Vec<u8>, MinerError> {
    let text = result
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| MinerError::ProtocolError(format!("work result lacks '{}'", key)))?;
    Ok(hex::decode(text)?)
}

/// Fills `work` with the fixed self-test pattern used when no pool is
/// configured: recognizable header bytes, current timestamp, and a
/// never-matching target.
pub fn benchmark_work(work: &mut Work) {
    for word in &mut work.data[..19] {
        *word = 0x5555_5555;
    }
    work.data[17] = (unix_time() as u32).swap_bytes();
    for word in &mut work.data[19..] {
        *word = 0;
    }
    work.data[20] = 0x8000_0000;
    work.data[31] = 0x0000_0280;
    work.target = [0u32; 8];
}

/// Work I/O thread state.
pub struct WorkIo {
    cfg: Arc<Config>,
    caps: AlgoCaps,
    ctx: Arc<MinerState>,
    stats: Arc<ShareStats>,
    queue: Arc<CommandQueue<WorkCmd>>,
    lp_queue: Arc<CommandQueue<String>>,
    client: Option<RpcClient>,
}

impl WorkIo {
    /// Creates the work I/O handler; the HTTP client is skipped entirely
    /// in benchmark mode.
    pub fn new(
        cfg: Arc<Config>,
        caps: AlgoCaps,
        ctx: Arc<MinerState>,
        stats: Arc<ShareStats>,
        queue: Arc<CommandQueue<WorkCmd>>,
        lp_queue: Arc<CommandQueue<String>>,
    ) -> Result<WorkIo, MinerError> {
        let client = if cfg.benchmark {
            None
        } else {
            Some(RpcClient::new(&cfg)?)
        };
        Ok(WorkIo {
            cfg,
            caps,
            ctx,
            stats,
            queue,
            lp_queue,
            client,
        })
    }

    /// Thread entry point: serve commands until shutdown or a fatal
    /// retry exhaustion, then freeze the queue.
    pub fn run(&self) {
        loop {
            match self.queue.pop(None) {
                Pop::Item(WorkCmd::GetWork { reply }) => {
                    if !self.serve_get_work(&reply) {
                        break;
                    }
                }
                Pop::Item(WorkCmd::SubmitWork(work)) => {
                    if !self.serve_submit(&work) {
                        break;
                    }
                }
                Pop::Item(WorkCmd::Shutdown) | Pop::Closed => break,
                Pop::TimedOut => continue,
            }
        }
        info!("terminating work I/O thread");
        self.queue.freeze();
    }

    /// Handles one GetWork command. Returns false on fatal failure.
    fn serve_get_work(&self, reply: &CommandQueue<Work>) -> bool {
        if self.cfg.benchmark {
            let mut work = Work::default();
            benchmark_work(&mut work);
            let _ = reply.push(work);
            return true;
        }

        let mut budget = RetryBudget::new(self.cfg.retries);
        loop {
            match self.get_upstream_work() {
                Ok(work) => {
                    let _ = reply.push(work);
                    return true;
                }
                Err(e) => {
                    if !budget.register_failure() {
                        error!("work request failed ({}), giving up", e);
                        return false;
                    }
                    warn!(
                        "work request failed ({}), retry after {} seconds",
                        e, self.cfg.fail_pause
                    );
                    thread::sleep(Duration::from_secs(self.cfg.fail_pause));
                }
            }
        }
    }

    fn get_upstream_work(&self) -> Result<Work, MinerError> {
        let client = self.require_client()?;
        let request = json!({"method": "getwork", "params": [], "id": 0});
        let (reply, lp_path) = client.call(&request)?;

        // First sighting of the long-poll header hands the path to the
        // long-poll thread.
        if let Some(path) = lp_path {
            if self.cfg.long_poll && !self.ctx.have_longpoll.swap(true, Ordering::SeqCst) {
                let _ = self.lp_queue.push(path);
            }
        }

        let result = reply
            .get("result")
            .ok_or_else(|| MinerError::ProtocolError("getwork reply lacks result".into()))?;
        work_decode(result, &self.caps)
    }

    /// Handles one SubmitWork command. Returns false on fatal failure.
    fn serve_submit(&self, work: &Work) -> bool {
        if self.cfg.benchmark {
            return true;
        }

        let mut budget = RetryBudget::new(self.cfg.retries);
        loop {
            match self.submit_upstream_work(work) {
                Ok(()) => return true,
                Err(e) => {
                    if !budget.register_failure() {
                        error!("share submission failed ({}), giving up", e);
                        return false;
                    }
                    warn!(
                        "share submission failed ({}), retry after {} seconds",
                        e, self.cfg.fail_pause
                    );
                    thread::sleep(Duration::from_secs(self.cfg.fail_pause));
                }
            }
        }
    }

    fn submit_upstream_work(&self, work: &Work) -> Result<(), MinerError> {
        {
            let global = guard(&self.ctx.global);
            if !should_submit(
                work,
                &global.work,
                self.ctx.submit_old.load(Ordering::SeqCst),
            ) {
                debug!("stale work detected, discarding share");
                return Ok(());
            }
        }

        let client = self.require_client()?;
        let mut bytes = Vec::with_capacity(128);
        for word in &work.data {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let request = json!({
            "method": "getwork",
            "params": [hex::encode(bytes)],
            "id": 1,
        });

        let (reply, _) = client.call(&request)?;
        let accepted = reply.get("result").and_then(Value::as_bool).unwrap_or(false);
        let reason = reply
            .get("reject-reason")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.stats.record_share(accepted, reason.as_deref());
        Ok(())
    }

    fn require_client(&self) -> Result<&RpcClient, MinerError> {
        self.client
            .as_ref()
            .ok_or_else(|| MinerError::ConfigError("no RPC endpoint configured".into()))
    }
}

/// Submission staleness policy: a share goes out unless it builds on a
/// superseded block and the pool has not asked for old submissions.
pub fn should_submit(work: &Work, current: &Work, submit_old: bool) -> bool {
    submit_old || work.same_parent_block(current)
}
