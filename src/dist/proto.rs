//! Coordinator wire protocol.
//!
//! Newline-delimited JSON: one request line, answered by one response line.
//!
//! Request format: `{"op": "check_next_turn", "partition": {"start": 0, "end": 256}}\n`
//! Response format: `{"kind": "status", ...}\n` or `{"kind": "error", "code": "...", "message": "..."}\n`

use serde::{Deserialize, Serialize};

use crate::{dist::Partition, Cell, Error, Params, Pos, Result};

/// One cell value, detached from any grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub pos: Pos,
    pub cell: Cell,
}

/// Work handed to a partition agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub partition: Partition,
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStatus {
    /// every partition is ready to compute the current turn.
    pub all_ready: bool,
    /// partitions not caught up with the current turn, diagnostic only.
    pub missing: Vec<Partition>,
    /// the run is over, agents stop polling.
    pub exit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTurn {
    /// turn to compute, also the number of completed generations.
    pub turn: u64,
    /// rows bordering the partition, from the last aggregated generation.
    pub edges: Vec<Point>,
}

/// State of a whole partition after computing `turn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub partition: Partition,
    pub turn: u64,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    FetchMyConfig,
    CheckNextTurn { partition: Partition },
    FetchNextTurn { partition: Partition },
    ReportMyState(Report),
    KeyPress { key: char },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::FetchMyConfig => "fetch_my_config",
            Request::CheckNextTurn { .. } => "check_next_turn",
            Request::FetchNextTurn { .. } => "fetch_next_turn",
            Request::ReportMyState(_) => "report_my_state",
            Request::KeyPress { .. } => "key_press",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// `assignment` is `None` once every partition has been claimed.
    Config { assignment: Option<Assignment> },
    Status(TurnStatus),
    NextTurn(NextTurn),
    Reported,
    KeyAccepted,
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl ToString) -> Self {
        Response::Error {
            code: code.into(),
            message: message.to_string(),
        }
    }

    /// turns an error response into [`Error::Rejected`].
    pub fn into_result(self) -> Result<Self> {
        match self {
            Response::Error { code, message } => Err(Error::Rejected { code, message }),
            other => Ok(other),
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_request(line: &str) -> Result<Request> {
    Ok(serde_json::from_str(line)?)
}

pub fn decode_response(line: &str) -> Result<Response> {
    Ok(serde_json::from_str(line)?)
}
