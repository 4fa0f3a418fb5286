// src/network/stratum.rs
//! Stratum session management
//!
//! Owns the TCP connection to a stratum pool: subscribe and authorize
//! handshakes, inbound notification handling (`mining.notify`,
//! `mining.set_difficulty`), share submission, and regeneration of the
//! shared work slot from the current job. The session thread is the
//! liveness root in stratum mode; when its reconnect budget is exhausted
//! it freezes the work I/O queue, which unwinds the whole process.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::{Value, json};

use crate::config::Config;
use crate::miner::algorithm::AlgoCaps;
use crate::miner::generator::{GenOptions, gen_work};
use crate::miner::work::{GlobalWork, MinerState, unix_time};
use crate::network::rpc::WorkCmd;
use crate::stats::ShareStats;
use crate::utils::{CommandQueue, MinerError, guard};

/// Seconds of inbound silence before the connection is declared dead.
const READ_TIMEOUT_SECS: u64 = 60;

/// One parsed `mining.notify` job.
#[derive(Debug, Clone, PartialEq)]
pub struct StratumJob {
    /// Server-assigned job identifier.
    pub job_id: String,
    /// Previous block hash bytes as sent on the wire.
    pub prevhash: [u8; 32],
    /// First half of the coinbase transaction.
    pub coinbase1: Vec<u8>,
    /// Second half of the coinbase transaction.
    pub coinbase2: Vec<u8>,
    /// Merkle branch hashes.
    pub merkle: Vec<[u8; 32]>,
    /// Block version bytes.
    pub version: [u8; 4],
    /// Compact difficulty bits.
    pub nbits: [u8; 4],
    /// Block timestamp bytes.
    pub ntime: [u8; 4],
    /// Whether older jobs must be abandoned immediately.
    pub clean: bool,
    /// Pool share difficulty in effect for this job.
    pub diff: f64,
    /// Reward field for the voting header family.
    pub nreward: [u8; 2],
    /// Extranonce2 counter, reset to zero for each new job.
    pub xnonce2: Vec<u8>,
}

impl StratumJob {
    /// Parses the parameter array of a `mining.notify` message.
    ///
    /// `diff` is the session difficulty in effect when the job arrives;
    /// `xnonce2_size` comes from the subscribe response.
    pub fn from_params(
        params: &[Value],
        xnonce2_size: usize,
        diff: f64,
    ) -> Result<StratumJob, MinerError> {
        if params.len() < 9 {
            return Err(MinerError::ProtocolError(format!(
                "notify carries {} params, expected at least 9",
                params.len()
            )));
        }

        let job_id = str_param(&params[0], "job id")?.to_string();
        let prevhash = fixed_hex::<32>(&params[1], "prevhash")?;
        let coinbase1 = hex::decode(str_param(&params[2], "coinbase1")?)?;
        let coinbase2 = hex::decode(str_param(&params[3], "coinbase2")?)?;

        let branches = params[4].as_array().ok_or_else(|| {
            MinerError::ProtocolError("notify merkle branches are not an array".into())
        })?;
        let mut merkle = Vec::with_capacity(branches.len());
        for branch in branches {
            merkle.push(fixed_hex::<32>(branch, "merkle branch")?);
        }

        let version = fixed_hex::<4>(&params[5], "version")?;
        let nbits = fixed_hex::<4>(&params[6], "nbits")?;
        let ntime = fixed_hex::<4>(&params[7], "ntime")?;
        let clean = params[8].as_bool().unwrap_or(false);

        // Optional tenth element: reward vote bytes for the voting family.
        let nreward = match params.get(9) {
            Some(value) if value.is_string() => fixed_hex::<2>(value, "nreward")?,
            _ => [0u8; 2],
        };

        Ok(StratumJob {
            job_id,
            prevhash,
            coinbase1,
            coinbase2,
            merkle,
            version,
            nbits,
            ntime,
            clean,
            diff,
            nreward,
            xnonce2: vec![0u8; xnonce2_size],
        })
    }
}

fn str_param<'a>(value: &'a Value, what: &str) -> Result<&'a str, MinerError> {
    value
        .as_str()
        .ok_or_else(|| MinerError::ProtocolError(format!("notify {} is not a string", what)))
}

fn fixed_hex<const N: usize>(value: &Value, what: &str) -> Result<[u8; N], MinerError> {
    let bytes = hex::decode(str_param(value, what)?)?;
    <[u8; N]>::try_from(bytes).map_err(|b| {
        MinerError::ProtocolError(format!("notify {} has {} bytes, expected {}", what, b.len(), N))
    })
}

#[derive(Debug, Default)]
struct SessionState {
    job: Option<StratumJob>,
    xnonce1: Vec<u8>,
    xnonce2_size: usize,
    next_diff: f64,
}

/// Long-lived stratum pool session shared between the session thread
/// (which runs the protocol) and the worker threads (which regenerate
/// work and submit shares through it).
pub struct StratumSession {
    cfg: Arc<Config>,
    caps: AlgoCaps,
    ctx: Arc<MinerState>,
    stats: Arc<ShareStats>,
    workio: Arc<CommandQueue<WorkCmd>>,
    state: Mutex<SessionState>,
    writer: Mutex<Option<TcpStream>>,
}

impl StratumSession {
    /// Creates a session; no connection is made until [`StratumSession::run`].
    pub fn new(
        cfg: Arc<Config>,
        caps: AlgoCaps,
        ctx: Arc<MinerState>,
        stats: Arc<ShareStats>,
        workio: Arc<CommandQueue<WorkCmd>>,
    ) -> Self {
        StratumSession {
            cfg,
            caps,
            ctx,
            stats,
            workio,
            state: Mutex::new(SessionState {
                next_diff: 1.0,
                ..SessionState::default()
            }),
            writer: Mutex::new(None),
        }
    }

    /// Session thread entry point: connect, handshake, serve, reconnect.
    ///
    /// Only handshake failures consume the retry budget; an interrupted
    /// established connection reconnects without counting. Returns once
    /// the budget is exhausted, after freezing the work I/O pipeline.
    pub fn run(&self) {
        let mut failures: i32 = 0;
        loop {
            // Workers must not keep scanning a job from a dead session.
            self.ctx.clear_work_time();
            self.ctx.restart_workers();

            let mut reader = match self.handshake() {
                Ok(reader) => reader,
                Err(e) => {
                    self.disconnect();
                    failures += 1;
                    if self.cfg.retries >= 0 && failures > self.cfg.retries {
                        error!("stratum handshake failed ({}), giving up", e);
                        let _ = self.workio.push(WorkCmd::Shutdown);
                        return;
                    }
                    warn!(
                        "stratum handshake failed ({}), retrying in {}s",
                        e, self.cfg.fail_pause
                    );
                    thread::sleep(Duration::from_secs(self.cfg.fail_pause));
                    continue;
                }
            };
            failures = 0;

            if let Err(e) = self.serve(&mut reader) {
                warn!("stratum connection interrupted: {}", e);
            }
            self.disconnect();
        }
    }

    fn handshake(&self) -> Result<BufReader<TcpStream>, MinerError> {
        let addr = stratum_addr(&self.cfg.url)?;
        info!("connecting to stratum server {}", addr);

        let stream = TcpStream::connect(addr.as_str())?;
        stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)))?;
        *guard(&self.writer) = Some(stream.try_clone()?);
        let mut reader = BufReader::new(stream);

        self.send(&json!({
            "id": 1,
            "method": "mining.subscribe",
            "params": [format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))],
        }))?;
        let reply = self.wait_response(&mut reader, 1)?;
        self.apply_subscription(&reply)?;

        self.send(&json!({
            "id": 2,
            "method": "mining.authorize",
            "params": [self.cfg.user.clone(), self.cfg.pass.clone()],
        }))?;
        let reply = self.wait_response(&mut reader, 2)?;
        if reply.get("result").and_then(Value::as_bool) != Some(true) {
            return Err(MinerError::ProtocolError(format!(
                "worker authorization rejected for '{}'",
                self.cfg.user
            )));
        }

        info!("stratum session established as {}", self.cfg.user);
        Ok(reader)
    }

    fn apply_subscription(&self, reply: &Value) -> Result<(), MinerError> {
        let result = reply
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| MinerError::ProtocolError("subscribe result is not an array".into()))?;
        let xnonce1_hex = result
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| MinerError::ProtocolError("subscribe reply lacks extranonce1".into()))?;
        let xnonce2_size = result
            .get(2)
            .and_then(Value::as_u64)
            .ok_or_else(|| MinerError::ProtocolError("subscribe reply lacks extranonce2 size".into()))?
            as usize;
        if xnonce2_size == 0 || xnonce2_size > 32 {
            return Err(MinerError::ProtocolError(format!(
                "unreasonable extranonce2 size {}",
                xnonce2_size
            )));
        }

        let mut state = guard(&self.state);
        state.xnonce1 = hex::decode(xnonce1_hex)?;
        state.xnonce2_size = xnonce2_size;
        state.job = None;
        debug!(
            "subscribed: extranonce1 {} bytes, extranonce2 {} bytes",
            state.xnonce1.len(),
            xnonce2_size
        );
        Ok(())
    }

    fn serve(&self, reader: &mut BufReader<TcpStream>) -> Result<(), MinerError> {
        loop {
            self.update_global_work();
            let line = read_line(reader)?;
            self.handle_line(&line);
        }
    }

    /// Reads one protocol line, dispatching notifications, until the
    /// response with `id` arrives.
    fn wait_response(
        &self,
        reader: &mut BufReader<TcpStream>,
        id: u64,
    ) -> Result<Value, MinerError> {
        loop {
            let line = read_line(reader)?;
            let msg: Value = serde_json::from_str(&line)?;
            if msg.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(err) = msg.get("error").filter(|e| !e.is_null()) {
                    return Err(MinerError::ProtocolError(format!(
                        "request {} rejected: {}",
                        id, err
                    )));
                }
                return Ok(msg);
            }
            self.handle_line(&line);
        }
    }

    fn handle_line(&self, line: &str) {
        let msg: Value = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("discarding unparseable stratum line: {}", e);
                return;
            }
        };

        match msg.get("method").and_then(Value::as_str) {
            Some(method) => {
                let empty = Vec::new();
                let params = msg
                    .get("params")
                    .and_then(Value::as_array)
                    .unwrap_or(&empty);
                self.handle_method(method, params);
            }
            None => self.handle_response(&msg),
        }
    }

    fn handle_method(&self, method: &str, params: &[Value]) {
        match method {
            "mining.notify" => {
                let (xnonce2_size, diff) = {
                    let state = guard(&self.state);
                    (state.xnonce2_size, state.next_diff)
                };
                match StratumJob::from_params(params, xnonce2_size, diff) {
                    Ok(job) => {
                        debug!("new job {} (clean={})", job.job_id, job.clean);
                        guard(&self.state).job = Some(job);
                    }
                    Err(e) => warn!("ignoring malformed job notification: {}", e),
                }
            }
            "mining.set_difficulty" => {
                if let Some(diff) = params.first().and_then(Value::as_f64).filter(|d| *d > 0.0) {
                    info!("stratum difficulty set to {}", diff);
                    guard(&self.state).next_diff = diff;
                }
            }
            other => debug!("ignoring stratum method '{}'", other),
        }
    }

    /// Handles a response to a previously submitted share.
    fn handle_response(&self, msg: &Value) {
        if msg.get("id").and_then(Value::as_u64).is_none() {
            return;
        }
        let accepted = msg.get("result").and_then(Value::as_bool).unwrap_or(false);
        let reason = msg
            .get("error")
            .and_then(Value::as_array)
            .and_then(|e| e.get(1))
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.stats.record_share(accepted, reason.as_deref());
    }

    /// Refreshes the shared work slot when a new job has arrived or the
    /// slot is empty. Lock order is global slot first, session second,
    /// same as the worker-side regeneration path.
    fn update_global_work(&self) {
        let mut restart = false;
        {
            let mut global = guard(&self.ctx.global);
            let mut state = guard(&self.state);
            let SessionState { job, xnonce1, .. } = &mut *state;
            let Some(job) = job.as_mut() else { return };

            if global.acquired_at != 0 && global.work.job_id == job.job_id {
                return;
            }

            let opts = GenOptions {
                caps: &self.caps,
                vote: self.cfg.vote.unwrap_or(0),
                difficulty: self.cfg.difficulty,
            };
            global.work = gen_work(job, xnonce1, &opts);
            global.acquired_at = unix_time();
            if job.clean {
                job.clean = false;
                restart = true;
            }
        }
        if restart {
            debug!("pool requested work restart");
            self.ctx.restart_workers();
        }
    }

    /// Regenerates directly into a slot the caller already holds locked.
    ///
    /// Used by workers that exhausted their nonce range. Returns false
    /// when no job has been received yet.
    pub fn regen_global(&self, global: &mut GlobalWork) -> bool {
        let mut state = guard(&self.state);
        let SessionState { job, xnonce1, .. } = &mut *state;
        let Some(job) = job.as_mut() else {
            return false;
        };

        let opts = GenOptions {
            caps: &self.caps,
            vote: self.cfg.vote.unwrap_or(0),
            difficulty: self.cfg.difficulty,
        };
        global.work = gen_work(job, xnonce1, &opts);
        global.acquired_at = unix_time();
        true
    }

    /// Submits one solved share over the session connection.
    pub fn submit(&self, work: &crate::miner::work::Work) -> Result<(), MinerError> {
        let ntime = hex::encode(work.data[17].to_le_bytes());
        let nonce = hex::encode(work.data[19].to_le_bytes());
        let xnonce2 = hex::encode(&work.xnonce2);

        let mut params = vec![
            Value::from(self.cfg.user.clone()),
            Value::from(work.job_id.clone()),
            Value::from(xnonce2),
            Value::from(ntime),
            Value::from(nonce),
        ];
        if self.caps.uses_vote {
            let vote = (work.data[20] & 0xffff) as u16;
            params.push(Value::from(hex::encode(vote.to_be_bytes())));
        }

        debug!("submitting share for job {}", work.job_id);
        self.send(&json!({"method": "mining.submit", "params": params, "id": 4}))
    }

    fn send(&self, msg: &Value) -> Result<(), MinerError> {
        let mut writer = guard(&self.writer);
        let stream = writer
            .as_mut()
            .ok_or_else(|| MinerError::ConnectionError("stratum session not connected".into()))?;
        let mut line = msg.to_string();
        line.push('\n');
        stream.write_all(line.as_bytes())?;
        Ok(())
    }

    fn disconnect(&self) {
        *guard(&self.writer) = None;
    }
}

/// Extracts `host:port` from a `stratum+tcp://` URL.
fn stratum_addr(url: &str) -> Result<String, MinerError> {
    let rest = url
        .strip_prefix("stratum+tcp://")
        .ok_or_else(|| MinerError::ConfigError(format!("not a stratum URL: {}", url)))?;
    let addr = rest.split('/').next().unwrap_or_default();
    if addr.is_empty() || !addr.contains(':') {
        return Err(MinerError::ConfigError(format!(
            "stratum URL needs host:port, got '{}'",
            url
        )));
    }
    Ok(addr.to_string())
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Result<String, MinerError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(MinerError::ConnectionError(
            "stratum server closed the connection".into(),
        ));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify_params() -> Vec<Value> {
        vec![
            Value::from("job7"),
            Value::from("00".repeat(31) + "01"),
            Value::from("0102"),
            Value::from("0304"),
            serde_json::json!(["ab".repeat(32)]),
            Value::from("00000002"),
            Value::from("1d00ffff"),
            Value::from("1a8b0553"),
            Value::from(true),
        ]
    }

    #[test]
    fn parses_notify_params() {
        let job = StratumJob::from_params(&notify_params(), 4, 2.0).unwrap();
        assert_eq!(job.job_id, "job7");
        assert_eq!(job.prevhash[31], 0x01);
        assert_eq!(job.coinbase1, vec![0x01, 0x02]);
        assert_eq!(job.coinbase2, vec![0x03, 0x04]);
        assert_eq!(job.merkle.len(), 1);
        assert_eq!(job.merkle[0], [0xab; 32]);
        assert_eq!(job.version, [0x00, 0x00, 0x00, 0x02]);
        assert!(job.clean);
        assert_eq!(job.diff, 2.0);
        assert_eq!(job.nreward, [0, 0]);
        assert_eq!(job.xnonce2, vec![0; 4]);
    }

    #[test]
    fn parses_optional_reward_bytes() {
        let mut params = notify_params();
        params.push(Value::from("0102"));
        let job = StratumJob::from_params(&params, 2, 1.0).unwrap();
        assert_eq!(job.nreward, [0x01, 0x02]);
    }

    #[test]
    fn rejects_short_notify() {
        let params = notify_params()[..5].to_vec();
        assert!(StratumJob::from_params(&params, 4, 1.0).is_err());
    }

    #[test]
    fn rejects_bad_prevhash_length() {
        let mut params = notify_params();
        params[1] = Value::from("0011");
        assert!(StratumJob::from_params(&params, 4, 1.0).is_err());
    }

    #[test]
    fn stratum_addr_requires_scheme_and_port() {
        assert_eq!(
            stratum_addr("stratum+tcp://pool.example.com:3333").unwrap(),
            "pool.example.com:3333"
        );
        assert!(stratum_addr("http://pool.example.com:3333").is_err());
        assert!(stratum_addr("stratum+tcp://pool.example.com").is_err());
    }
}
